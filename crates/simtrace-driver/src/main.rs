use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use simtrace_api::{mutate_router, MutateState};
use simtrace_replay::{ReplayEngine, ReplayState, ScheduleControls};
use simtrace_tracker::OwnershipTracker;

/// Entrypoint for the simulation driver: runs the replay engine against the
/// decoded trace, serves the admission mutator over TLS, and resolves
/// simulated pods back to their trace owners for TTL assignment. Parameters
/// come from the driver's controlling job spec. The simulation-level
/// custom-resource controller that hands this process a trace location and
/// simulation identity is an external collaborator; this binary only
/// consumes what it is told.
#[derive(Debug, Parser)]
#[command(name = "simtrace-driver", about = "Replays a trace into an isolated simulation cluster", version)]
struct Args {
    /// Identity stamped onto simulated pods and checked by the admission
    /// mutator's no-op gate.
    #[arg(long, env = "SIMTRACE_SIMULATION_ID")]
    simulation_id: String,

    /// Kind/namespaced-name of the simulation-root object whose deletion
    /// cascades to tear down everything this run created. Reserved for the
    /// garbage-collector handoff at drain time; not otherwise read by this
    /// binary.
    #[arg(long, env = "SIMTRACE_SIMULATION_ROOT")]
    #[allow(dead_code)]
    simulation_root: String,

    /// Namespace prefix simulated namespaces are created under. Reserved
    /// for the lazy-namespace-creation step of priming; this binary assumes
    /// namespaces already exist in the isolated simulation cluster.
    #[arg(long, env = "SIMTRACE_VIRTUAL_NAMESPACE_PREFIX", default_value = "sim-")]
    #[allow(dead_code)]
    virtual_namespace_prefix: String,

    /// Address the admission mutator listens on.
    #[arg(long, env = "SIMTRACE_ADMISSION_BIND", default_value = "0.0.0.0:8443")]
    admission_bind: SocketAddr,

    /// TLS certificate for the admission endpoint.
    #[arg(long, env = "SIMTRACE_TLS_CERT")]
    tls_cert: PathBuf,

    /// TLS private key for the admission endpoint.
    #[arg(long, env = "SIMTRACE_TLS_KEY")]
    tls_key: PathBuf,

    /// Trace location: `file://`, `s3://`, `gs://`, or `azure://`.
    #[arg(long, env = "SIMTRACE_TRACE_URI")]
    trace_uri: String,

    /// Replay speed factor: sim-seconds per wall-second.
    #[arg(long, env = "SIMTRACE_SPEED_FACTOR", default_value_t = 1.0)]
    speed_factor: f64,

    /// How long to hold the drained state before tearing down, in seconds.
    /// Absent means "wait for an external drain signal".
    #[arg(long, env = "SIMTRACE_DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Number of times to replay the trace.
    #[arg(long, env = "SIMTRACE_REPETITIONS", default_value_t = 1)]
    repetitions: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let exit_code = run(args).await?;
    std::process::exit(exit_code);
}

async fn run(args: Args) -> Result<i32> {
    let trace = fetch_trace(&args.trace_uri).await.context("fetching trace")?;
    info!(uri = %args.trace_uri, events = trace.events.len(), "trace loaded");

    let client = kube::Client::try_default().await.context("building orchestrator client")?;
    let tracker = Arc::new(OwnershipTracker::new(client.clone(), &trace));

    let cancel = CancellationToken::new();
    let admission_handle = axum_server::Handle::new();

    let mutate_app = mutate_router(MutateState { tracker: tracker.clone(), sim_id: args.simulation_id.clone() });
    let tls_config = RustlsConfig::from_pem_file(&args.tls_cert, &args.tls_key)
        .await
        .context("loading admission TLS material")?;

    let admission_server = {
        let handle = admission_handle.clone();
        tokio::spawn(async move {
            axum_server::bind_rustls(args.admission_bind, tls_config)
                .handle(handle)
                .serve(mutate_app.into_make_service())
                .await
        })
    };
    info!(bind = %args.admission_bind, "admission mutator listening");

    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let controls = ScheduleControls {
        speed_factor: args.speed_factor,
        duration: args.duration_secs.map(Duration::from_secs),
        repetitions: args.repetitions,
    };

    let mut final_state = ReplayState::Done;
    for rep in 0..controls.repetitions {
        if cancel.is_cancelled() {
            break;
        }
        info!(repetition = rep, total = controls.repetitions, "starting replay");
        let engine = ReplayEngine::new(client.clone(), trace.clone(), controls.clone());
        let report = engine.run(cancel.clone()).await;
        info!(repetition = rep, events_played = report.events_played, state = ?report.state, "replay finished");
        final_state = report.state;
        if final_state == ReplayState::Failed {
            for err in &report.errors {
                error!(repetition = rep, %err, "replay error");
            }
            break;
        }
    }

    admission_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    if let Err(e) = admission_server.await.context("admission server task panicked")? {
        error!(error = %e, "admission server exited with an error");
    }

    Ok(if final_state == ReplayState::Failed { 1 } else { 0 })
}

/// Resolve `file://`, `s3://`, `gs://`, or `azure://` and fetch the
/// complete trace document, then decode it and verify its schema version.
async fn fetch_trace(uri: &str) -> Result<simtrace_core::Trace> {
    let url = Url::parse(uri).with_context(|| format!("trace URI '{uri}' is not a valid URL"))?;
    let (store, path) = object_store::parse_url(&url).context("resolving trace store backend")?;
    let bytes = store.get(&path).await.context("fetching trace object")?.bytes().await.context("reading trace body")?;
    let trace = simtrace_codec::decode(&bytes).context("decoding trace")?;
    Ok(trace)
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received, cancelling replay");
    cancel.cancel();
}
