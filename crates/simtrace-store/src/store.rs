use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use simtrace_core::{
    canonicalize, content_hash, timeline::NamespacedName, CanonicalObject, Gvk, KindIndex, PodLifecycleTable, Trace,
    TimelineEvent, TrackerConfig,
};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::export;
use crate::filter::ExportFilter;

/// How long an `export()` call will wait to acquire the read snapshot
/// before giving up with `ExportUnavailable`.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Inner {
    config: TrackerConfig,
    events: Vec<TimelineEvent>,
    index: KindIndex,
    pod_lifecycles: PodLifecycleTable,
}

/// A timeline of apply/delete events, a per-kind content index, and a
/// pod-lifecycle table, behind a single mutation point. All mutating calls
/// serialize through the inner `RwLock`'s writer; `export` takes a short
/// read hold to clone a consistent snapshot, then computes outside the
/// lock.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    inner: Arc<RwLock<Inner>>,
}

impl ObjectStore {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                config,
                events: Vec::new(),
                index: KindIndex::new(),
                pod_lifecycles: PodLifecycleTable::new(),
            })),
        }
    }

    /// Canonicalize and commit an applied object.
    pub async fn observe_applied(
        &self,
        kind: Gvk,
        name: NamespacedName,
        obj: &Value,
        ts: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let kind_config = inner
            .config
            .get(&kind)
            .cloned()
            .ok_or_else(|| StoreError::UntrackedKind(kind.to_string()))?;
        let canonical = canonicalize(obj, &kind.to_string(), &kind_config.pod_spec_template_paths)?;
        let hash = content_hash(&canonical.0).0;

        trace!(%kind, %name, hash, "observed applied object");
        let event = push_or_merge(&mut inner.events, ts);
        event.applied.push((kind.clone(), name.clone(), canonical));
        inner.index.entry(kind).or_default().insert(name, hash);
        Ok(())
    }

    /// Canonicalize and commit a deleted object.
    pub async fn observe_deleted(
        &self,
        kind: Gvk,
        name: NamespacedName,
        obj: &Value,
        ts: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let kind_config = inner
            .config
            .get(&kind)
            .cloned()
            .ok_or_else(|| StoreError::UntrackedKind(kind.to_string()))?;
        let canonical = canonicalize(obj, &kind.to_string(), &kind_config.pod_spec_template_paths)?;

        trace!(%kind, %name, "observed deleted object");
        let event = push_or_merge(&mut inner.events, ts);
        event.deleted.push((kind.clone(), name.clone(), canonical));
        if let Some(kind_entries) = inner.index.get_mut(&kind) {
            kind_entries.remove(&name);
        }
        Ok(())
    }

    /// The namespaced names currently live in the Kind Index for `kind`,
    /// used by the watch fabric's resync-by-diff: compare against the set
    /// observed during a full list to find drifted deletes.
    pub async fn live_keys(&self, kind: &Gvk) -> Vec<NamespacedName> {
        let inner = self.inner.read().await;
        inner.index.get(kind).map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    /// Emit a synthetic delete for a key the watch fabric's resync found
    /// missing from a full list but still present in the Kind Index. The
    /// object body itself is unknown at this point — only its key survived
    /// the drift — so the timeline event carries an empty canonical body.
    pub async fn observe_drift_deleted(&self, kind: Gvk, name: NamespacedName, ts: i64) {
        let mut inner = self.inner.write().await;
        trace!(%kind, %name, "observed drifted delete on resync");
        let event = push_or_merge(&mut inner.events, ts);
        event.deleted.push((kind.clone(), name.clone(), CanonicalObject(Value::Null)));
        if let Some(kind_entries) = inner.index.get_mut(&kind) {
            kind_entries.remove(&name);
        }
    }

    /// Append a lifecycle record with an open end.
    pub async fn record_pod_start(&self, owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64) {
        let mut inner = self.inner.write().await;
        simtrace_core::lifecycle::record_start(&mut inner.pod_lifecycles, owner_kind, owner_name, template_hash, ts);
    }

    /// Close the most recent matching open lifecycle record. Accepts
    /// out-of-order arrival: if no open record exists, opens then closes at
    /// `ts`.
    pub async fn record_pod_end(&self, owner_kind: Gvk, owner_name: NamespacedName, template_hash: u64, ts: i64) {
        let mut inner = self.inner.write().await;
        simtrace_core::lifecycle::record_end(&mut inner.pod_lifecycles, owner_kind, owner_name, template_hash, ts);
    }

    /// Record that the watch fabric dropped an event at `ts` because the
    /// mutation queue was saturated. Recorded as a gap marker rather than
    /// silently lost so a trace reader can see it.
    pub async fn record_gap(&self, ts: i64) {
        let mut inner = self.inner.write().await;
        inner.events.push(TimelineEvent::gap_marker(ts));
    }

    /// Filters the store down to a time window and encodes it as a trace.
    /// Takes a bounded read snapshot, then computes the filtered trace
    /// outside the lock.
    pub async fn export(&self, start_ts: i64, end_ts: i64, filter: &ExportFilter) -> Result<Trace, StoreError> {
        if end_ts < start_ts {
            return Err(StoreError::InvalidRange);
        }

        let snapshot = {
            let guard = tokio::time::timeout(SNAPSHOT_TIMEOUT, self.inner.read())
                .await
                .map_err(|_| StoreError::ExportUnavailable)?;
            (guard.config.clone(), guard.events.clone(), guard.pod_lifecycles.clone())
        };
        let (config, events, pod_lifecycles) = snapshot;

        debug!(start_ts, end_ts, events = events.len(), "computing export snapshot");
        Ok(export::compute(config, &events, &pod_lifecycles, start_ts, end_ts, filter))
    }
}

/// Find-or-create the timeline event for `ts`: consecutive observations at
/// the same `ts` merge into one event, matching the Timeline Event
/// invariant that no two events share a `ts` for the same key.
fn push_or_merge(events: &mut Vec<TimelineEvent>, ts: i64) -> &mut TimelineEvent {
    let needs_new = events.last().map_or(true, |e| e.ts != ts);
    if needs_new {
        events.push(TimelineEvent::empty(ts));
    }
    events.last_mut().expect("just pushed or already present")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simtrace_core::TrackedKindConfig;

    fn config_with_deployment() -> TrackerConfig {
        let mut tracked_objects = std::collections::HashMap::new();
        tracked_objects.insert(
            Gvk::new("apps", "v1", "Deployment"),
            TrackedKindConfig { pod_spec_template_paths: vec![], track_lifecycle: true },
        );
        TrackerConfig { tracked_objects }
    }

    #[tokio::test]
    async fn observe_applied_updates_the_index() {
        let store = ObjectStore::new(config_with_deployment());
        let kind = Gvk::new("apps", "v1", "Deployment");
        let name = NamespacedName::new("default", "web");
        store
            .observe_applied(kind.clone(), name.clone(), &json!({"metadata": {"name": "web"}}), 100)
            .await
            .unwrap();

        let trace = store.export(50, 200, &ExportFilter::default()).await.unwrap();
        assert_eq!(trace.index[&kind][&name], content_hash(&json!({"metadata": {"name": "web"}})).0);
    }

    #[tokio::test]
    async fn observe_deleted_removes_from_index() {
        let store = ObjectStore::new(config_with_deployment());
        let kind = Gvk::new("apps", "v1", "Deployment");
        let name = NamespacedName::new("default", "web");
        store
            .observe_applied(kind.clone(), name.clone(), &json!({"metadata": {"name": "web"}}), 100)
            .await
            .unwrap();
        store
            .observe_deleted(kind.clone(), name.clone(), &json!({"metadata": {"name": "web"}}), 150)
            .await
            .unwrap();

        let trace = store.export(90, 160, &ExportFilter::default()).await.unwrap();
        assert!(trace.index.get(&kind).map_or(true, |m| m.is_empty()));
    }

    #[tokio::test]
    async fn untracked_kind_is_rejected() {
        let store = ObjectStore::new(TrackerConfig::default());
        let result = store
            .observe_applied(Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("default", "web"), &json!({}), 1)
            .await;
        assert!(matches!(result, Err(StoreError::UntrackedKind(_))));
    }

    #[tokio::test]
    async fn invalid_range_is_rejected() {
        let store = ObjectStore::new(config_with_deployment());
        let result = store.export(200, 100, &ExportFilter::default()).await;
        assert!(matches!(result, Err(StoreError::InvalidRange)));
    }
}
