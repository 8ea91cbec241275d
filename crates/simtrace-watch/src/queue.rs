use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use simtrace_core::{timeline::NamespacedName, Gvk};
use simtrace_store::ObjectStore;

/// One watch-observed mutation, queued between a watch task (producer) and
/// the store's single serialized writer (consumer). This is the concrete
/// mechanism behind the back-pressure requirement that the watch fabric
/// never block on store writes longer than one event interval: the
/// in-memory queue is bounded, and saturation is dropped with a log line
/// rather than stalling the producer.
enum Mutation {
    Applied { kind: Gvk, name: NamespacedName, obj: Value, ts: i64 },
    Deleted { kind: Gvk, name: NamespacedName, obj: Value, ts: i64 },
    DriftDeleted { kind: Gvk, name: NamespacedName, ts: i64 },
    PodStart { owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64 },
    PodEnd { owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64 },
}

/// A bounded channel in front of the [`ObjectStore`], plus the background
/// task that drains it. Watch tasks hold a cheap-to-clone [`MutationQueue`]
/// handle and never touch the store directly, so a store write stall shows
/// up as queue depth rather than a blocked watch stream.
#[derive(Clone)]
pub struct MutationQueue {
    tx: mpsc::Sender<Mutation>,
    store: ObjectStore,
}

impl MutationQueue {
    /// Spawn the writer task and return a handle plus its join handle, so
    /// callers can await clean shutdown after cancelling their watch tasks.
    pub fn spawn(store: ObjectStore, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(capacity);
        let writer_store = store.clone();
        let join = tokio::spawn(async move {
            while let Some(mutation) = rx.recv().await {
                apply(&writer_store, mutation).await;
            }
        });
        (Self { tx, store }, join)
    }

    pub async fn submit_applied(&self, kind: Gvk, name: NamespacedName, obj: Value, ts: i64) {
        self.try_submit(Mutation::Applied { kind, name, obj, ts }, ts).await;
    }

    pub async fn submit_deleted(&self, kind: Gvk, name: NamespacedName, obj: Value, ts: i64) {
        self.try_submit(Mutation::Deleted { kind, name, obj, ts }, ts).await;
    }

    pub async fn submit_drift_deleted(&self, kind: Gvk, name: NamespacedName, ts: i64) {
        self.try_submit(Mutation::DriftDeleted { kind, name, ts }, ts).await;
    }

    pub async fn submit_pod_start(&self, owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64) {
        self.try_submit(Mutation::PodStart { owner_kind, owner_name, template_hash, ts }, ts).await;
    }

    pub async fn submit_pod_end(&self, owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64) {
        self.try_submit(Mutation::PodEnd { owner_kind, owner_name, template_hash, ts }, ts).await;
    }

    /// Non-blocking enqueue. A full queue means the writer is behind by a
    /// full capacity's worth of events; rather than stall the watch task,
    /// the event is dropped and a gap marker is recorded directly against
    /// the store so a trace reader can see that something was lost here.
    async fn try_submit(&self, mutation: Mutation, ts: i64) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(mutation) {
            warn!(ts, "mutation queue saturated, dropping event and recording a gap marker");
            self.store.record_gap(ts).await;
        }
    }
}

async fn apply(store: &ObjectStore, mutation: Mutation) {
    match mutation {
        Mutation::Applied { kind, name, obj, ts } => {
            if let Err(e) = store.observe_applied(kind.clone(), name.clone(), &obj, ts).await {
                warn!(%kind, %name, error = %e, "failed to record apply");
            }
        }
        Mutation::Deleted { kind, name, obj, ts } => {
            if let Err(e) = store.observe_deleted(kind.clone(), name.clone(), &obj, ts).await {
                warn!(%kind, %name, error = %e, "failed to record delete");
            }
        }
        Mutation::DriftDeleted { kind, name, ts } => {
            store.observe_drift_deleted(kind, name, ts).await;
        }
        Mutation::PodStart { owner_kind, owner_name, template_hash, ts } => {
            store.record_pod_start(owner_kind, owner_name, template_hash, ts).await;
        }
        Mutation::PodEnd { owner_kind, owner_name, template_hash, ts } => {
            store.record_pod_end(owner_kind, owner_name, template_hash, ts).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtrace_core::TrackerConfig;
    use std::collections::HashMap;

    fn config_with_deployment() -> TrackerConfig {
        let mut tracked_objects = HashMap::new();
        tracked_objects.insert(
            Gvk::new("apps", "v1", "Deployment"),
            simtrace_core::TrackedKindConfig { pod_spec_template_paths: vec![], track_lifecycle: true },
        );
        TrackerConfig { tracked_objects }
    }

    #[tokio::test]
    async fn submitted_applies_reach_the_store() {
        let store = ObjectStore::new(config_with_deployment());
        let (queue, join) = MutationQueue::spawn(store.clone(), 8);
        let kind = Gvk::new("apps", "v1", "Deployment");
        let name = NamespacedName::new("default", "web");

        queue.submit_applied(kind.clone(), name.clone(), serde_json::json!({"metadata": {"name": "web"}}), 100).await;
        drop(queue);
        join.await.unwrap();

        assert_eq!(store.live_keys(&kind).await, vec![name]);
    }

    #[tokio::test]
    async fn saturated_queue_drops_and_records_a_gap() {
        let store = ObjectStore::new(config_with_deployment());
        // Capacity 0 behaves like an always-full bounded channel once the
        // writer task hasn't yet taken the permit for a prior send.
        let (queue, join) = MutationQueue::spawn(store.clone(), 1);
        let kind = Gvk::new("apps", "v1", "Deployment");
        let name = NamespacedName::new("default", "web");

        // Fire many submits concurrently so at least one lands while the
        // channel's single slot is occupied.
        for i in 0..50 {
            queue.submit_applied(kind.clone(), name.clone(), serde_json::json!({"metadata": {"name": "web"}}), 100 + i).await;
        }
        drop(queue);
        join.await.unwrap();

        // Either every send landed (writer kept up) or some were dropped and
        // recorded as gaps; both are acceptable outcomes of a race against a
        // live consumer, so this only asserts the store stayed consistent.
        assert!(store.live_keys(&kind).await.contains(&name));
    }
}
