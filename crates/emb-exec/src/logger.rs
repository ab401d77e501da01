use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use emb_model::Flag;

/// Configuration for subprocess output logging.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Max line length before truncation.
    pub max_line_length: usize,
    /// Log stdout at INFO level (false = DEBUG). Only used for streamed output.
    pub stdout_info: Flag,
    /// Log stderr at WARN level (false = DEBUG).
    pub stderr_warn: Flag,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            stdout_info: Flag::on(),
            stderr_warn: Flag::on(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Cut `line` to at most `max` bytes on a char boundary.
pub(crate) fn truncate_line(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

pub(crate) fn emit(name: &str, stream: Stream, line: &str, cfg: &LogConfig) {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return;
    }
    let line = truncate_line(line, cfg.max_line_length);
    let loud = match stream {
        Stream::Stdout => cfg.stdout_info.is_on(),
        Stream::Stderr => cfg.stderr_warn.is_on(),
    };
    match (stream, loud) {
        (Stream::Stdout, true) => info!(process = %name, stream = stream.as_str(), "{line}"),
        (Stream::Stderr, true) => warn!(process = %name, stream = stream.as_str(), "{line}"),
        _ => debug!(process = %name, stream = stream.as_str(), "{line}"),
    }
}

/// Log every line of captured output.
pub(crate) fn emit_captured(name: &str, stream: Stream, bytes: &[u8], cfg: &LogConfig) {
    for line in String::from_utf8_lossy(bytes).lines() {
        emit(name, stream, line, cfg);
    }
}

/// Forward a live pipe to the log until EOF.
///
/// Must be called inside a tokio runtime; the task ends with it.
pub(crate) fn pump<R>(name: String, stream: Stream, reader: R, cfg: LogConfig) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => emit(&name, stream, &String::from_utf8_lossy(&buf), &cfg),
                Err(e) => {
                    debug!(process = %name, stream = stream.as_str(), error = %e, "pipe read failed");
                    break;
                }
            }
        }
    })
}
