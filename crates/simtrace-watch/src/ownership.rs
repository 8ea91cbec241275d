use std::collections::HashSet;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::{Client, ResourceExt};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use simtrace_core::{timeline::NamespacedName, Gvk, TrackerConfig};

use crate::error::WatchError;
use crate::k8s_gvk::gvk_from_api_version;

/// Bounds the controller back-reference walk so a malformed chain of
/// owners cannot spin the resolver forever.
const MAX_OWNERSHIP_DEPTH: usize = 16;

/// `(owner kind, owner namespaced name)` — the key lifecycle records and
/// the admission mutator's TTL lookup are both indexed by.
pub type OwnerKey = (Gvk, NamespacedName);

/// Caches `ApiResource` discovery per `Gvk` so repeated owner-chain walks
/// don't re-query the API server's discovery endpoint for every pod.
#[derive(Clone)]
pub struct KindResolver {
    client: Client,
    cache: Arc<RwLock<std::collections::HashMap<Gvk, ApiResource>>>,
}

impl KindResolver {
    pub fn new(client: Client) -> Self {
        Self { client, cache: Arc::new(RwLock::new(std::collections::HashMap::new())) }
    }

    /// Resolve and cache the `ApiResource` for `gvk`, discovering it from
    /// the API server on first use.
    pub async fn resolve(&self, gvk: &Gvk) -> Result<ApiResource, WatchError> {
        if let Some(ar) = self.cache.read().await.get(gvk) {
            return Ok(ar.clone());
        }
        let query = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let (ar, _caps) = kube::discovery::pinned_kind(&self.client, &query).await?;
        self.cache.write().await.insert(gvk.clone(), ar.clone());
        Ok(ar)
    }
}

/// Walk a pod's (or any object's) controller back-reference chain until it
/// reaches a tracked kind, returning that ancestor's key. Returns `Ok(None)`
/// if the chain bottoms out (no controller owner, or an owner kind is
/// untracked with no further owner) without error. Returns
/// [`WatchError::OwnershipUnresolved`] if an owner object could not be
/// fetched (it may simply not be cached on the API server yet) — the
/// caller retries this case with backoff.
pub async fn resolve_owner_chain(
    client: &Client,
    resolver: &KindResolver,
    config: &TrackerConfig,
    namespace: &str,
    owner_refs: &[OwnerReference],
    subject: &str,
) -> Result<Option<OwnerKey>, WatchError> {
    let mut visited: HashSet<(String, String)> = HashSet::new();
    let mut current: Vec<OwnerReference> = owner_refs.to_vec();

    for _ in 0..MAX_OWNERSHIP_DEPTH {
        let Some(owner) = current.iter().find(|o| o.controller.unwrap_or(false)) else {
            return Ok(None);
        };
        let gvk = gvk_from_api_version(&owner.api_version, &owner.kind);
        if !visited.insert((gvk.to_string(), owner.name.clone())) {
            warn!(%subject, owner = %owner.name, kind = %gvk, "cyclic ownership chain detected, discarding");
            return Ok(None);
        }

        if config.get(&gvk).is_some() {
            return Ok(Some((gvk, NamespacedName::new(namespace, owner.name.clone()))));
        }

        let ar = resolver.resolve(&gvk).await?;
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
        let owner_obj = match api.get(&owner.name).await {
            Ok(obj) => obj,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(%subject, owner = %owner.name, kind = %gvk, "owner object not found, dropping chain");
                return Ok(None);
            }
            Err(e) => {
                debug!(%subject, owner = %owner.name, kind = %gvk, error = %e, "owner lookup failed, will retry");
                return Err(WatchError::OwnershipUnresolved { pod: subject.to_string() });
            }
        };
        current = owner_obj.owner_references().to_vec();
    }

    warn!(%subject, "ownership chain exceeded max depth, discarding");
    Ok(None)
}
