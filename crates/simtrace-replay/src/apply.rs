use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ApiResource, DynamicObject, ObjectMeta, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::Client;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use simtrace_core::{CanonicalObject, Gvk};

use crate::error::ReplayError;

/// Field manager identity server-side apply uses to own the fields this
/// engine writes.
const FIELD_MANAGER: &str = "simtrace-replay";

/// Caches `ApiResource` discovery per `Gvk` for the lifetime of one replay
/// run, the same way the watch fabric caches it for one watch session.
#[derive(Clone)]
pub struct ApiResourceCache {
    client: Client,
    cache: Arc<RwLock<HashMap<Gvk, ApiResource>>>,
}

impl ApiResourceCache {
    pub fn new(client: Client) -> Self {
        Self { client, cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn resolve(&self, gvk: &Gvk) -> Result<ApiResource, ReplayError> {
        if let Some(ar) = self.cache.read().await.get(gvk) {
            return Ok(ar.clone());
        }
        let query = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let (ar, _caps) = kube::discovery::pinned_kind(&self.client, &query).await?;
        self.cache.write().await.insert(gvk.clone(), ar.clone());
        Ok(ar)
    }
}

/// Lazily creates namespaces the first time an owning object demands them,
/// and remembers which ones it has already confirmed exist so repeated
/// applies into the same namespace don't re-check the API server every time.
#[derive(Clone)]
pub struct NamespaceEnsurer {
    client: Client,
    known: Arc<Mutex<HashSet<String>>>,
}

impl NamespaceEnsurer {
    pub fn new(client: Client) -> Self {
        Self { client, known: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// No-op for the empty (cluster-scoped) namespace. Treats a 409
    /// AlreadyExists response as success — another apply in the same
    /// event, or an operator-managed namespace, may have created it first.
    pub async fn ensure(&self, namespace: &str) -> Result<(), ReplayError> {
        if namespace.is_empty() || self.known.lock().await.contains(namespace) {
            return Ok(());
        }

        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta { name: Some(namespace.to_string()), ..Default::default() },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                self.known.lock().await.insert(namespace.to_string());
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                self.known.lock().await.insert(namespace.to_string());
                Ok(())
            }
            Err(e) => Err(ReplayError::Kube(e)),
        }
    }
}

/// Apply one canonical object with server-side apply, retrying transient
/// failures (conflicts, server errors) with bounded backoff. A validation
/// failure (422) is non-transient and returned immediately.
pub async fn apply_object(
    client: &Client,
    ar: &ApiResource,
    namespace: &str,
    name: &str,
    obj: &CanonicalObject,
) -> Result<(), ReplayError> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
    let dynamic_obj = canonical_to_dynamic(obj)?;
    let params = PatchParams::apply(FIELD_MANAGER).force();

    (|| async { api.patch(name, &params, &Patch::Apply(&dynamic_obj)).await })
        .retry(ExponentialBuilder::default().with_max_times(5))
        .when(is_transient)
        .await
        .map_err(|e| classify(namespace, name, e))?;

    debug!(%namespace, %name, "applied object");
    Ok(())
}

/// Delete one object by key. A not-found response is treated as success:
/// the desired end state (absent) already holds.
pub async fn delete_object(client: &Client, ar: &ApiResource, namespace: &str, name: &str) -> Result<(), ReplayError> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
    let result = (|| async { api.delete(name, &Default::default()).await })
        .retry(ExponentialBuilder::default().with_max_times(5))
        .when(is_transient)
        .await;

    match result {
        Ok(_) => {
            debug!(%namespace, %name, "deleted object");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => {
            warn!(%namespace, %name, error = %e, "delete failed");
            Err(ReplayError::Kube(e))
        }
    }
}

fn canonical_to_dynamic(obj: &CanonicalObject) -> Result<DynamicObject, ReplayError> {
    let value: Value = obj.0.clone();
    serde_json::from_value(value).map_err(|e| ReplayError::Validation {
        namespace: String::new(),
        name: String::new(),
        reason: format!("malformed object: {e}"),
    })
}

fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(e) => e.code == 409 || e.code >= 500,
        kube::Error::Service(_) | kube::Error::HyperError(_) => true,
        _ => false,
    }
}

fn classify(namespace: &str, name: &str, err: kube::Error) -> ReplayError {
    match &err {
        kube::Error::Api(e) if e.code == 422 => ReplayError::Validation {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: e.message.clone(),
        },
        _ => ReplayError::Kube(err),
    }
}
