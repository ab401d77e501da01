use std::{io, path::Path, time::Duration};

use futures::StreamExt;
use reqwest::{
    Client,
    header::{CONTENT_LENGTH, HeaderMap},
};
use tokio::{
    fs,
    io::AsyncWriteExt,
    time::{self, Instant},
};
use tracing::{debug, info, instrument};

use crate::{
    error::FetchError,
    lock::{LockFile, lock_path},
};

/// Local size polling interval of [`ArtifactAcquirer::wait_complete`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Makes sure a remote artifact exists locally, downloading it at most once.
#[derive(Debug, Clone)]
pub struct ArtifactAcquirer {
    client: Client,
    poll_interval: Duration,
}

impl Default for ArtifactAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactAcquirer {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Download `url` to `dest` unless some process already did.
    ///
    /// Holds the exclusive lock on `<dest>.lock` for the whole check-and-download.
    /// An existing `dest` is trusted as complete. `timeout` bounds the download,
    /// not the wait for the lock.
    #[instrument(level = "info", skip(self, dest, timeout), fields(dest = %dest.display()))]
    pub async fn ensure(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), FetchError> {
        ensure_parent(dest).await?;
        let _lock = LockFile::acquire(lock_path(dest)).await?;

        if fs::try_exists(dest).await? {
            info!("artifact already present");
            return Ok(());
        }

        info!("downloading artifact");
        let written = time::timeout(timeout, self.download(url, dest))
            .await
            .map_err(|_| FetchError::Timeout { waited: timeout })??;
        info!(bytes = written, "artifact downloaded");
        Ok(())
    }

    /// Wait without locking until `dest` reaches the size the server advertises.
    pub async fn wait_complete(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let expected = self.remote_size(url).await?;
        self.wait_for_size(dest, expected, timeout).await
    }

    /// `Content-Length` reported by `HEAD url`.
    pub async fn remote_size(&self, url: &str) -> Result<u64, FetchError> {
        let resp = self.client.head(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Download(format!("HEAD returned {status}")));
        }
        content_length(resp.headers()).ok_or(FetchError::MissingContentLength)
    }

    /// Poll the local size of `dest` until it equals `expected`. A missing file counts as empty.
    pub async fn wait_for_size(
        &self,
        dest: &Path,
        expected: u64,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let size = local_size(dest).await?;
            if size == expected {
                return Ok(());
            }

            let mut pause = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(FetchError::Timeout { waited: timeout });
                }
                pause = pause.min(deadline - now);
            }
            debug!(dest = %dest.display(), size, expected, "artifact incomplete");
            time::sleep(pause).await;
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Download(format!("GET returned {status}")));
        }
        let expected = content_length(resp.headers());

        let mut file = fs::File::create(dest).await?;
        let mut body = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = match (chunk, expected) {
                (Ok(chunk), _) => chunk,
                // A body cut short of its advertised length surfaces as a body error.
                (Err(e), Some(expected)) if e.is_body() && written < expected => {
                    debug!(error = %e, written, expected, "body ended early");
                    return Err(FetchError::SizeMismatch {
                        expected,
                        actual: written,
                    });
                }
                (Err(e), _) => return Err(e.into()),
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        match expected {
            Some(expected) if expected != written => Err(FetchError::SizeMismatch {
                expected,
                actual: written,
            }),
            _ => Ok(written),
        }
    }
}

async fn ensure_parent(dest: &Path) -> Result<(), FetchError> {
    let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(parent)
        .await?;
    Ok(())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn local_size(path: &Path) -> io::Result<u64> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write as _, os::unix::fs::PermissionsExt};

    use reqwest::header::HeaderValue;

    const BODY: &[u8] = b"pretend these are model weights";

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_download_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sam.pth")
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("checkpoint.pth");
        let url = format!("{}/sam.pth", server.url());
        let a = ArtifactAcquirer::new();
        let b = ArtifactAcquirer::new();

        let (ra, rb) = tokio::join!(
            a.ensure(&url, &dest, Duration::from_secs(10)),
            b.ensure(&url, &dest, Duration::from_secs(10)),
        );
        ra.unwrap();
        rb.unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn existing_artifact_is_not_downloaded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/sam.pth").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("checkpoint.pth");
        std::fs::write(&dest, b"already here").unwrap();

        ArtifactAcquirer::new()
            .ensure(&format!("{}/sam.pth", server.url()), &dest, Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn creates_private_parent_directories() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/w").with_body(BODY).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("storage").join("models");
        let dest = parent.join("checkpoint.pth");

        ArtifactAcquirer::new()
            .ensure(&format!("{}/w", server.url()), &dest, Duration::from_secs(5))
            .await
            .unwrap();

        let mode = std::fs::metadata(&parent).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        assert!(lock_path(&dest).exists());
    }

    #[tokio::test]
    async fn error_status_is_a_download_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/missing").with_status(404).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactAcquirer::new()
            .ensure(
                &format!("{}/missing", server.url()),
                &dir.path().join("c.pth"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Download(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn slow_download_times_out() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/slow")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(500));
                w.write_all(BODY)
            })
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactAcquirer::new()
            .ensure(
                &format!("{}/slow", server.url()),
                &dir.path().join("c.pth"),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn wait_for_size_returns_once_file_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("c.pth");
        let acquirer = ArtifactAcquirer::new().with_poll_interval(Duration::from_millis(10));

        let writer = {
            let dest = dest.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(40)).await;
                fs::write(&dest, BODY).await.unwrap();
            })
        };

        acquirer
            .wait_for_size(&dest, BODY.len() as u64, Duration::from_secs(5))
            .await
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_size_times_out_on_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("c.pth");
        std::fs::write(&dest, &BODY[..4]).unwrap();

        let err = ArtifactAcquirer::new()
            .with_poll_interval(Duration::from_millis(10))
            .wait_for_size(&dest, BODY.len() as u64, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    /// Answer every connection with `response` verbatim, for headers mockito
    /// would otherwise derive from the body.
    async fn raw_server(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut req = [0u8; 4096];
                    let _ = sock.read(&mut req).await;
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn wait_complete_follows_the_advertised_size() {
        let url = raw_server(
            "HTTP/1.1 200 OK\r\ncontent-length: 31\r\nconnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(BODY.len(), 31);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("c.pth");
        let acquirer = ArtifactAcquirer::new().with_poll_interval(Duration::from_millis(10));
        assert_eq!(acquirer.remote_size(&url).await.unwrap(), 31);

        let writer = {
            let dest = dest.clone();
            tokio::spawn(async move {
                let mut file = fs::File::create(&dest).await.unwrap();
                file.write_all(&BODY[..10]).await.unwrap();
                file.flush().await.unwrap();
                time::sleep(Duration::from_millis(50)).await;
                file.write_all(&BODY[10..]).await.unwrap();
                file.flush().await.unwrap();
            })
        };

        acquirer
            .wait_complete(&url, &dest, Duration::from_secs(5))
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn head_without_length_is_rejected() {
        let url = raw_server(
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n",
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactAcquirer::new()
            .wait_complete(&url, &dir.path().join("c.pth"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::MissingContentLength), "{err:?}");
    }

    #[tokio::test]
    async fn head_error_status_is_a_download_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("HEAD", "/gone").with_status(410).create_async().await;

        let err = ArtifactAcquirer::new()
            .remote_size(&format!("{}/gone", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Download(msg) if msg.contains("410")));
    }

    #[tokio::test]
    async fn short_body_is_a_size_mismatch() {
        let url = raw_server(
            "HTTP/1.1 200 OK\r\ncontent-length: 100\r\nconnection: close\r\n\r\nonly twenty bytes!!!",
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("c.pth");
        let err = ArtifactAcquirer::new()
            .ensure(&url, &dest, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            FetchError::SizeMismatch { expected, actual } => {
                assert_eq!(expected, 100);
                assert!(actual <= 20, "{actual}");
            }
            other => panic!("expected SizeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2564550879"));
        assert_eq!(content_length(&headers), Some(2_564_550_879));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("nope"));
        assert_eq!(content_length(&headers), None);
    }
}
