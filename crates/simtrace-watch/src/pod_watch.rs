use backon::{ExponentialBuilder, Retryable};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use simtrace_core::{canonicalize_pod_spec, content_hash, now_ts, timeline::NamespacedName, TrackerConfig};

use crate::error::WatchError;
use crate::ownership::{resolve_owner_chain, KindResolver};
use crate::queue::MutationQueue;

/// Cluster-wide pod watch: on every apply, resolve the pod's owning
/// tracked ancestor and record `record_pod_start`; on every delete, record
/// `record_pod_end`. Pods whose owner chain never reaches a tracked kind
/// are ignored — they contribute nothing to the Pod Lifecycle Table.
pub async fn run_pod_watch(
    client: Client,
    config: TrackerConfig,
    queue: MutationQueue,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let resolver = KindResolver::new(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let mut stream = Box::pin(watcher(pods, watcher::Config::default()).default_backoff());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            item = stream.next() => item,
        };

        let Some(event) = next else { return Ok(()) };

        match event {
            Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
            Ok(watcher::Event::InitApply(pod) | watcher::Event::Apply(pod)) => {
                on_apply(&client, &resolver, &config, &queue, pod).await;
            }
            Ok(watcher::Event::Delete(pod)) => {
                on_delete(&client, &resolver, &config, &queue, pod).await;
            }
            Err(e) => {
                warn!(error = %e, "pod watch stream error, backoff will retry");
            }
        }
    }
}

async fn on_apply(
    client: &Client,
    resolver: &KindResolver,
    config: &TrackerConfig,
    queue: &MutationQueue,
    pod: Pod,
) {
    let Some(spec) = pod.spec.as_ref() else { return };
    let subject = format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
    let owner = match resolve_with_retry(client, resolver, config, &pod, &subject).await {
        Ok(Some(owner)) => owner,
        Ok(None) => return,
        Err(e) => {
            warn!(pod = %subject, error = %e, "giving up on ownership resolution");
            return;
        }
    };

    let spec_value = match serde_json::to_value(spec) {
        Ok(v) => v,
        Err(e) => {
            warn!(pod = %subject, error = %e, "failed to serialize pod spec");
            return;
        }
    };
    let template_hash = content_hash(&canonicalize_pod_spec(&spec_value)).0;
    debug!(pod = %subject, owner = %owner.1, template_hash, "recording pod start");
    queue.submit_pod_start(owner.0, owner.1, template_hash, now_ts()).await;
}

async fn on_delete(
    client: &Client,
    resolver: &KindResolver,
    config: &TrackerConfig,
    queue: &MutationQueue,
    pod: Pod,
) {
    let Some(spec) = pod.spec.as_ref() else { return };
    let subject = format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
    let owner = match resolve_with_retry(client, resolver, config, &pod, &subject).await {
        Ok(Some(owner)) => owner,
        Ok(None) => return,
        Err(e) => {
            warn!(pod = %subject, error = %e, "giving up on ownership resolution for delete");
            return;
        }
    };

    let spec_value = match serde_json::to_value(spec) {
        Ok(v) => v,
        Err(_) => return,
    };
    let template_hash = content_hash(&canonicalize_pod_spec(&spec_value)).0;
    debug!(pod = %subject, owner = %owner.1, template_hash, "recording pod end");
    queue.submit_pod_end(owner.0, owner.1, template_hash, now_ts()).await;
}

/// Owner lookups can race a just-created parent object that hasn't been
/// cached by the API server yet; retry a bounded number of times with
/// exponential backoff before giving up on this pod.
async fn resolve_with_retry(
    client: &Client,
    resolver: &KindResolver,
    config: &TrackerConfig,
    pod: &Pod,
    subject: &str,
) -> Result<Option<(simtrace_core::Gvk, NamespacedName)>, WatchError> {
    let namespace = pod.namespace().unwrap_or_default();
    let owner_refs = pod.owner_references().to_vec();

    (|| async {
        resolve_owner_chain(client, resolver, config, &namespace, &owner_refs, subject).await
    })
    .retry(ExponentialBuilder::default().with_max_times(3))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pod_without_spec_is_ignored() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "bare", "namespace": "default"},
        }))
        .unwrap();
        assert!(pod.spec.is_none());
    }
}
