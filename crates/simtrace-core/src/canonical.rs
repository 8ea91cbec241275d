use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::path::TemplatePath;

/// An object stripped of server-assigned fields and with every configured
/// pod template further normalized. Canonicalization is idempotent and
/// deterministic: running it twice, or in any order of its internal
/// phases, yields bit-identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalObject(pub Value);

const TOP_LEVEL_STRIP: &[&str] = &["status"];

const METADATA_STRIP: &[&str] = &[
    "resourceVersion",
    "uid",
    "generation",
    "managedFields",
    "creationTimestamp",
    "selfLink",
    "ownerReferences",
];

/// Volume-name prefix the control plane synthesizes for projected
/// service-account token mounts.
const SYNTHESIZED_TOKEN_VOLUME_PREFIX: &str = "kube-api-access-";

const DEFAULT_SERVICE_ACCOUNT_NAMES: &[&str] = &["default"];

/// `canonicalize(obj, template_paths) -> canonical`: deep-walk `obj`,
/// strip the fields enumerated in the data model, then further normalize
/// every pod template reachable through `template_paths`. The phase order
/// (strip object-level fields, then walk template paths, then normalize
/// each template) is fixed so two callers invoking the same phases in any
/// order still produce the same bytes — there is exactly one order.
pub fn canonicalize(obj: &Value, kind: &str, template_paths: &[TemplatePath]) -> Result<CanonicalObject, CoreError> {
    let mut obj = obj.clone();
    strip_object_level_fields(&mut obj);
    for path in template_paths {
        let templates = path.resolve_mut(&mut obj, kind)?;
        for template in templates {
            normalize_pod_template(template);
        }
    }
    Ok(CanonicalObject(obj))
}

fn strip_object_level_fields(obj: &mut Value) {
    if let Value::Object(map) = obj {
        for key in TOP_LEVEL_STRIP {
            map.remove(*key);
        }
        if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
            for key in METADATA_STRIP {
                metadata.remove(*key);
            }
        }
    }
}

/// Canonicalize a live pod's `spec` the same way a configured pod
/// template's `spec` is normalized, so that two pods instantiated from the
/// same owning template reduce to the same shape regardless of their
/// synthesized names: the pod's spec is canonicalized against the owner's
/// configured template shape to extract its pod-template hash. The result
/// is meant to be passed to [`crate::hash::content_hash`],
/// not compared against the owner's own canonical form — the two live in
/// separate hash spaces.
pub fn canonicalize_pod_spec(spec: &Value) -> Value {
    let mut template = serde_json::json!({ "spec": spec });
    normalize_pod_template(&mut template);
    template
}

/// Normalize a single pod template in place: drop synthesized
/// service-account token volumes, normalize image-pull-secret ordering,
/// remove a default-named service account reference, and drop empty
/// collections left behind by the above.
fn normalize_pod_template(template: &mut Value) {
    let Some(spec) = template.get_mut("spec").and_then(|s| s.as_object_mut()) else {
        return;
    };

    if let Some(name) = spec.get("serviceAccountName").and_then(|v| v.as_str()) {
        if DEFAULT_SERVICE_ACCOUNT_NAMES.contains(&name) {
            spec.remove("serviceAccountName");
        }
    }
    if let Some(name) = spec.get("serviceAccount").and_then(|v| v.as_str()) {
        if DEFAULT_SERVICE_ACCOUNT_NAMES.contains(&name) {
            spec.remove("serviceAccount");
        }
    }

    if let Some(Value::Array(volumes)) = spec.get_mut("volumes") {
        volumes.retain(|v| {
            let name = v.get("name").and_then(|n| n.as_str()).unwrap_or("");
            !name.starts_with(SYNTHESIZED_TOKEN_VOLUME_PREFIX)
        });
    }

    if let Some(Value::Array(secrets)) = spec.get_mut("imagePullSecrets") {
        secrets.sort_by(|a, b| {
            let a = a.get("name").and_then(|n| n.as_str()).unwrap_or("");
            let b = b.get("name").and_then(|n| n.as_str()).unwrap_or("");
            a.cmp(b)
        });
    }

    drop_empty_collections(spec);
    if let Some(Value::Object(meta)) = template.get_mut("metadata") {
        meta.remove("creationTimestamp");
        drop_empty_collections(meta);
    }
}

fn drop_empty_collections(map: &mut serde_json::Map<String, Value>) {
    map.retain(|_, v| match v {
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment_template_paths() -> Vec<TemplatePath> {
        vec![TemplatePath::parse("spec.template").unwrap()]
    }

    #[test]
    fn strips_status_and_server_assigned_metadata() {
        let obj = json!({
            "metadata": {"name": "web", "resourceVersion": "123", "uid": "abc"},
            "spec": {"template": {"spec": {}}},
            "status": {"replicas": 3},
        });
        let canon = canonicalize(&obj, "Deployment", &[]).unwrap();
        assert!(canon.0.get("status").is_none());
        assert!(canon.0["metadata"].get("resourceVersion").is_none());
        assert!(canon.0["metadata"].get("uid").is_none());
        assert_eq!(canon.0["metadata"]["name"], "web");
    }

    #[test]
    fn removes_synthesized_token_volumes() {
        let obj = json!({
            "spec": {"template": {"spec": {
                "volumes": [
                    {"name": "kube-api-access-abc12"},
                    {"name": "data"},
                ]
            }}}
        });
        let canon = canonicalize(&obj, "Deployment", &deployment_template_paths()).unwrap();
        let volumes = canon.0["spec"]["template"]["spec"]["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0]["name"], "data");
    }

    #[test]
    fn removes_default_service_account_name() {
        let obj = json!({"spec": {"template": {"spec": {"serviceAccountName": "default"}}}});
        let canon = canonicalize(&obj, "Deployment", &deployment_template_paths()).unwrap();
        assert!(canon.0["spec"]["template"]["spec"].get("serviceAccountName").is_none());
    }

    #[test]
    fn keeps_non_default_service_account_name() {
        let obj = json!({"spec": {"template": {"spec": {"serviceAccountName": "custom"}}}});
        let canon = canonicalize(&obj, "Deployment", &deployment_template_paths()).unwrap();
        assert_eq!(canon.0["spec"]["template"]["spec"]["serviceAccountName"], "custom");
    }

    #[test]
    fn is_idempotent() {
        let obj = json!({
            "metadata": {"name": "web", "resourceVersion": "123"},
            "spec": {"template": {"spec": {
                "serviceAccountName": "default",
                "volumes": [{"name": "kube-api-access-xyz"}],
            }}},
            "status": {},
        });
        let once = canonicalize(&obj, "Deployment", &deployment_template_paths()).unwrap();
        let twice = canonicalize(&once.0, "Deployment", &deployment_template_paths()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_pod_spec_normalizes_like_a_template() {
        let spec = json!({
            "serviceAccountName": "default",
            "volumes": [{"name": "kube-api-access-xyz"}, {"name": "data"}],
        });
        let canon = canonicalize_pod_spec(&spec);
        assert!(canon["spec"].get("serviceAccountName").is_none());
        assert_eq!(canon["spec"]["volumes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn canonicalize_pod_spec_of_sibling_pods_has_equal_hash() {
        use crate::hash::content_hash;
        let a = json!({"serviceAccountName": "default", "containers": [{"name": "c", "image": "x"}]});
        let b = json!({"serviceAccountName": "default", "containers": [{"name": "c", "image": "x"}]});
        assert_eq!(content_hash(&canonicalize_pod_spec(&a)), content_hash(&canonicalize_pod_spec(&b)));
    }

    #[test]
    fn unreachable_template_path_is_a_config_error() {
        let obj = json!({"spec": {}});
        let paths = vec![TemplatePath::parse("spec.template").unwrap()];
        assert!(canonicalize(&obj, "Deployment", &paths).is_err());
    }
}
