use std::collections::HashSet;

use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use simtrace_core::{now_ts, timeline::NamespacedName, Gvk};
use simtrace_store::ObjectStore;

use crate::error::WatchError;
use crate::queue::MutationQueue;

/// Watch every object of one tracked kind cluster-wide and mirror
/// apply/delete events into the store via the mutation queue, until
/// `cancel` fires.
///
/// `watcher::Event::Init`/`InitApply`/`InitDone` carry the initial list;
/// we fold them the same as a steady-state `Apply`, since the store's
/// `observe_applied` is idempotent on re-application. `InitDone` additionally
/// triggers a resync-by-diff against the Kind Index to catch objects deleted
/// while the watch was reconnecting.
pub async fn run_kind_watch(
    client: Client,
    ar: ApiResource,
    gvk: Gvk,
    store: ObjectStore,
    queue: MutationQueue,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let api: Api<DynamicObject> = Api::all_with(client, &ar);
    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    let mut seen_this_init: HashSet<NamespacedName> = HashSet::new();

    info!(%gvk, "starting kind watch");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                info!(%gvk, "kind watch cancelled");
                return Ok(());
            }
            item = stream.next() => item,
        };

        let Some(event) = next else {
            info!(%gvk, "kind watch stream ended");
            return Ok(());
        };

        match event {
            Ok(watcher::Event::Init) => {
                seen_this_init.clear();
            }
            Ok(watcher::Event::InitApply(obj)) => {
                let name = namespaced_name(&obj);
                seen_this_init.insert(name.clone());
                apply(&queue, &gvk, name, &obj).await;
            }
            Ok(watcher::Event::InitDone) => {
                resync(&store, &queue, &gvk, &seen_this_init).await;
            }
            Ok(watcher::Event::Apply(obj)) => {
                let name = namespaced_name(&obj);
                apply(&queue, &gvk, name, &obj).await;
            }
            Ok(watcher::Event::Delete(obj)) => {
                let name = namespaced_name(&obj);
                let ts = now_ts();
                let value = serde_json::to_value(&obj).unwrap_or(serde_json::Value::Null);
                queue.submit_deleted(gvk.clone(), name, value, ts).await;
            }
            Err(e) => {
                warn!(%gvk, error = %e, "kind watch stream error, backoff will retry");
            }
        }
    }
}

fn namespaced_name(obj: &DynamicObject) -> NamespacedName {
    NamespacedName::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

async fn apply(queue: &MutationQueue, gvk: &Gvk, name: NamespacedName, obj: &DynamicObject) {
    let ts = now_ts();
    let value = serde_json::to_value(obj).unwrap_or(serde_json::Value::Null);
    queue.submit_applied(gvk.clone(), name, value, ts).await;
}

/// Compare the set of keys observed during the just-finished initial list
/// against the Kind Index; anything still indexed but not re-observed was
/// deleted while the watch was away.
async fn resync(store: &ObjectStore, queue: &MutationQueue, gvk: &Gvk, seen: &HashSet<NamespacedName>) {
    let ts = now_ts();
    for key in store.live_keys(gvk).await {
        if !seen.contains(&key) {
            info!(%gvk, %key, "resync found drifted delete");
            queue.submit_drift_deleted(gvk.clone(), key, ts).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_name_defaults_to_empty_namespace_for_cluster_scoped() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "node-a"},
        }))
        .unwrap();
        let name = namespaced_name(&obj);
        assert_eq!(name.namespace, "");
        assert_eq!(name.name, "node-a");
    }
}
