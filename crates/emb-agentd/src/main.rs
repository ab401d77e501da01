mod config;

use std::{
    process,
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use emb_api::{DispatcherAdapter, HttpApi};
use emb_core::{
    ComputeError, DispatchContext, Dispatcher, MetricsHandle, Supervised, Supervisor, WorkerLoop,
};
use emb_exec::{SubprocessCompute, SubprocessListener};
use emb_fetch::ArtifactAcquirer;
use emb_model::RestartStrategy;
use emb_observe::{init_local_offset, init_logger};
use emb_prometheus::PrometheusMetrics;

use crate::config::Args;

/// Exit status when a supervised target runs out of restarts.
const EXIT_SUPERVISOR_EXHAUSTED: i32 = 4;

fn main() -> anyhow::Result<()> {
    // Offset detection only works while the process is still single-threaded.
    init_local_offset();
    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    init_logger(&args.logger_config())?;
    let service = args.service_config()?;
    info!(
        model_type = %service.model_type,
        device = %service.device,
        checkpoint = %service.checkpoint_path().display(),
        "configuration resolved"
    );

    ArtifactAcquirer::new()
        .ensure(&service.checkpoint_url, service.checkpoint_path(), args.download_timeout())
        .await
        .context("checkpoint acquisition failed")?;

    let metrics = PrometheusMetrics::new()?;
    let ctx = DispatchContext::new(Arc::new(metrics.clone()));
    let shutdown = CancellationToken::new();
    let strategy = args.restart_strategy();

    let compute_cfg = args.compute_config(&service);
    compute_cfg.validate()?;
    let factory = move || SubprocessCompute::new(compute_cfg.clone()).map_err(ComputeError::from);
    let worker = WorkerLoop::new(ctx.clone(), factory, shutdown.clone());

    let mut supervised = vec![spawn_supervised(
        "embd-worker",
        worker,
        strategy,
        shutdown.clone(),
        ctx.metrics().clone(),
    )?];
    if let Some(cfg) = args.listener_config(&service) {
        let listener = SubprocessListener::new(cfg, shutdown.clone())?;
        supervised.push(spawn_supervised(
            "embd-listener",
            listener,
            strategy,
            shutdown.clone(),
            ctx.metrics().clone(),
        )?);
    }

    let dispatcher = Dispatcher::new(ctx, args.dispatch_config());
    let app = HttpApi::new(Arc::new(DispatcherAdapter::new(dispatcher)))
        .router()
        .merge(metrics_router(metrics));

    let tcp = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(addr = %args.listen, "listening");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped; stopping workers");
    shutdown.cancel();
    for handle in supervised {
        let joined = tokio::task::spawn_blocking(move || handle.join()).await?;
        if joined.is_err() {
            warn!("supervisor thread panicked during shutdown");
        }
    }
    info!("shutdown complete");
    Ok(())
}

/// Drive `target` under a [`Supervisor`] on its own OS thread.
///
/// Budget exhaustion terminates the whole process: the service serves all work or none.
fn spawn_supervised<S>(
    thread_name: &str,
    target: S,
    strategy: RestartStrategy,
    shutdown: CancellationToken,
    metrics: MetricsHandle,
) -> std::io::Result<JoinHandle<()>>
where
    S: Supervised + 'static,
{
    thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            let supervisor = Supervisor::new(target, strategy, shutdown).with_metrics(metrics);
            match supervisor.run() {
                Ok(()) => info!("supervisor stopped"),
                Err(e) => {
                    error!(error = %e, "terminating process");
                    process::exit(EXIT_SUPERVISOR_EXHAUSTED);
                }
            }
        })
}

fn metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

/// GET /metrics
async fn render_metrics(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
