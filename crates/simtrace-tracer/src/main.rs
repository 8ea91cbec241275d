use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simtrace_api::{export_router, ExportState};
use simtrace_config::load_tracker_config;
use simtrace_store::ObjectStore;
use simtrace_watch::WatchFabric;

/// Entrypoint for the trace recorder: runs the watch fabric against the
/// orchestrator, feeds it into the object store, and serves the store's
/// export endpoint. Out of scope for this binary: the CLI front-end and
/// manifest-generation tooling belong to an external collaborator.
#[derive(Debug, Parser)]
#[command(name = "simtrace-tracer", about = "Records orchestrator object state into a portable trace", version)]
struct Args {
    /// Path to the tracker config file (YAML).
    #[arg(long, env = "SIMTRACE_TRACKER_CONFIG")]
    tracker_config: PathBuf,

    /// Address the Export API listens on.
    #[arg(long, env = "SIMTRACE_EXPORT_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = load_tracker_config(&args.tracker_config).context("loading tracker config")?;
    info!(tracked_kinds = config.tracked_objects.len(), "tracker config loaded");

    let client = kube::Client::try_default().await.context("building orchestrator client")?;
    let store = ObjectStore::new(config.clone());

    let fabric = WatchFabric::start(client, config, store.clone()).await;

    let app = export_router(ExportState { store });
    let listener = tokio::net::TcpListener::bind(args.bind).await.context("binding export listener")?;
    info!(bind = %args.bind, "export API listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    serve.await.context("export API server exited with an error")?;

    fabric.shutdown().await;
    info!("tracer shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received, draining");
}
