use kube::core::GroupVersionKind;
use kube::Client;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use simtrace_core::TrackerConfig;
use simtrace_store::ObjectStore;

use crate::error::WatchError;
use crate::kind_watch::run_kind_watch;
use crate::pod_watch::run_pod_watch;
use crate::queue::MutationQueue;

/// Bound on the mutation queue between watch tasks and the store's writer.
/// Sized generously for burst traffic from a full list replay on reconnect;
/// sustained saturation past this is a real backlog, not noise, and gets
/// recorded as gap markers.
const MUTATION_QUEUE_CAPACITY: usize = 4096;

/// One watch task per tracked kind plus a single cluster-wide pod watch,
/// all feeding the store through a single bounded mutation queue, torn
/// down together when `shutdown` is called.
pub struct WatchFabric {
    cancel: CancellationToken,
    tasks: JoinSet<Result<(), WatchError>>,
    writer: JoinHandle<()>,
}

impl WatchFabric {
    /// Discover each tracked kind's `ApiResource` up front and spawn its
    /// watch task, plus the pod watch and the queue's writer task. Discovery
    /// failures for one kind do not prevent the others from starting; they
    /// are logged and that kind is skipped.
    pub async fn start(client: Client, config: TrackerConfig, store: ObjectStore) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let (queue, writer) = MutationQueue::spawn(store.clone(), MUTATION_QUEUE_CAPACITY);

        for gvk in config.tracked_objects.keys().cloned() {
            let query = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
            match kube::discovery::pinned_kind(&client, &query).await {
                Ok((ar, _caps)) => {
                    let client = client.clone();
                    let store = store.clone();
                    let queue = queue.clone();
                    let cancel = cancel.child_token();
                    let gvk_for_task = gvk.clone();
                    tasks.spawn(async move { run_kind_watch(client, ar, gvk_for_task, store, queue, cancel).await });
                }
                Err(e) => {
                    error!(%gvk, error = %e, "could not discover tracked kind, skipping its watch");
                }
            }
        }

        let pod_cancel = cancel.child_token();
        let pod_client = client.clone();
        let pod_config = config.clone();
        let pod_queue = queue.clone();
        tasks.spawn(async move { run_pod_watch(pod_client, pod_config, pod_queue, pod_cancel).await });

        info!(tracked_kinds = config.tracked_objects.len(), "watch fabric started");
        Self { cancel, tasks, writer }
    }

    /// Signal every watch task to stop, wait for them to finish, then let
    /// the mutation queue drain into the store before returning. Errors
    /// from individual tasks are logged, not propagated: a shutdown always
    /// completes.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "watch task exited with error"),
                Err(e) => error!(error = %e, "watch task panicked"),
            }
        }
        // All producer handles were held by the tasks just joined (plus the
        // one `queue` clone dropped with this struct); once they're gone the
        // writer's `rx.recv()` returns `None` and it exits on its own.
        if let Err(e) = self.writer.await {
            error!(error = %e, "mutation queue writer panicked");
        }
        info!("watch fabric shut down");
    }
}
