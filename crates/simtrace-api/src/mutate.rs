use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use simtrace_tracker::OwnershipTracker;

use crate::error::ApiError;

const SIMULATION_LABEL: &str = "simulation";
const NODE_ROLE_SELECTOR_KEY: &str = "node-role";
const VIRTUAL_NODE_VALUE: &str = "virtual";
const VIRTUAL_NODE_TAINT_KEY: &str = "virtual-node-taint";
const LIFETIME_ANNOTATION: &str = "lifetime-seconds";

#[derive(Clone)]
pub struct MutateState {
    pub tracker: Arc<OwnershipTracker>,
    pub sim_id: String,
}

/// One route, `POST /mutate`, served over TLS by the caller (see
/// `simtrace-driver`).
pub fn mutate_router(state: MutateState) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn mutate_handler(
    State(state): State<MutateState>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<_> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!("invalid admission request: {err}");
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };

    let res = AdmissionResponse::from(&req);
    let name = req.object.as_ref().map(|o| o.name_any()).unwrap_or_default();
    let res = if let Some(obj) = &req.object {
        match mutate(&state, obj, res.clone()).await {
            Ok(r) => {
                info!(pod = %name, "admission mutation evaluated");
                r
            }
            Err(err) => {
                // Internal errors never block pod creation: log and allow.
                warn!(pod = %name, error = %err, "mutator internal error, allowing unmodified");
                res
            }
        }
    } else {
        res
    };
    Json(res.into_review())
}

/// Evaluates and applies the patch contract; on any no-op condition
/// (ownership not resolved, owner not part of this simulation) returns
/// `res` unchanged.
async fn mutate(state: &MutateState, obj: &DynamicObject, res: AdmissionResponse) -> Result<AdmissionResponse, ApiError> {
    let pod: Pod = serde_json::from_value(serde_json::to_value(obj).map_err(|e| ApiError::internal(e.to_string()))?)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let Some(owner) = state.tracker.resolve_owner(&pod).await.map_err(|e| ApiError::internal(e.to_string()))? else {
        return Ok(res);
    };

    if !state
        .tracker
        .owner_belongs_to_simulation(&owner, &state.sim_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Ok(res);
    }

    let mut patches = [label_op(obj, &state.sim_id), node_selector_ops(obj), toleration_ops(obj)].concat();

    if let Some(spec) = &pod.spec {
        let spec_value = serde_json::to_value(spec).map_err(|e| ApiError::internal(e.to_string()))?;
        let template_hash = simtrace_core::content_hash(&simtrace_core::canonicalize_pod_spec(&spec_value)).0;
        if let Some(ttl) = state.tracker.representative_ttl(&owner, template_hash) {
            patches.extend(annotation_ops(obj, LIFETIME_ANNOTATION, &ttl.as_secs().to_string()));
        }
    }

    Ok(res.with_patch(Patch(patches)).map_err(|e| ApiError::internal(e.to_string()))?)
}

/// Add `metadata.labels.simulation = sim_id`, creating the `labels` map
/// first if the pod doesn't have one yet. Idempotent: re-running against an
/// already-labeled pod with the same value is a no-op patch set (empty).
fn label_op(obj: &DynamicObject, sim_id: &str) -> Vec<PatchOperation> {
    if obj.labels().get(SIMULATION_LABEL).map(|v| v.as_str()) == Some(sim_id) {
        return Vec::new();
    }
    map_entry_ops(obj, &["metadata", "labels"], SIMULATION_LABEL, json!(sim_id))
}

fn annotation_ops(obj: &DynamicObject, key: &str, value: &str) -> Vec<PatchOperation> {
    if obj.annotations().get(key).map(|v| v.as_str()) == Some(value) {
        return Vec::new();
    }
    map_entry_ops(obj, &["metadata", "annotations"], key, json!(value))
}

fn node_selector_ops(obj: &DynamicObject) -> Vec<PatchOperation> {
    let already_set = obj
        .data
        .get("spec")
        .and_then(|s| s.get("nodeSelector"))
        .and_then(|n| n.get(NODE_ROLE_SELECTOR_KEY))
        .and_then(|v| v.as_str())
        == Some(VIRTUAL_NODE_VALUE);
    if already_set {
        return Vec::new();
    }
    map_entry_ops(obj, &["spec", "nodeSelector"], NODE_ROLE_SELECTOR_KEY, json!(VIRTUAL_NODE_VALUE))
}

fn toleration_ops(obj: &DynamicObject) -> Vec<PatchOperation> {
    let tolerations = obj.data.get("spec").and_then(|s| s.get("tolerations")).and_then(|t| t.as_array());
    let already_tolerated = tolerations
        .map(|arr| arr.iter().any(|t| t.get("key").and_then(|k| k.as_str()) == Some(VIRTUAL_NODE_TAINT_KEY)))
        .unwrap_or(false);
    if already_tolerated {
        return Vec::new();
    }
    let toleration = json!({
        "key": VIRTUAL_NODE_TAINT_KEY,
        "operator": "Exists",
        "effect": "NoSchedule",
    });
    match tolerations {
        Some(_) => vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "tolerations", "-"]),
            value: toleration,
        })],
        None => vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "tolerations"]),
            value: json!([toleration]),
        })],
    }
}

/// Build the `Add` patch ops for setting `map_path.key = value`: if the map
/// at `map_path` doesn't exist yet, an extra op creates it first, matching
/// the confirmed upstream idiom for mutating admission patches.
fn map_entry_ops(obj: &DynamicObject, map_path: &[&str], key: &str, value: serde_json::Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    let map_exists = map_path.iter().try_fold(&obj.data, |cur, seg| cur.get(seg)).is_some();
    if !map_exists {
        ops.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(map_path.iter().copied()),
            value: json!({}),
        }));
    }
    let mut tokens: Vec<&str> = map_path.to_vec();
    tokens.push(key);
    ops.push(PatchOperation::Add(AddOperation { path: PointerBuf::from_tokens(tokens), value }));
    ops
}
