use simtrace_core::{Gvk, NamespacedName};
use serde_json::Value;

/// `filters` from an export request. Label selectors are `key=value`
/// equality matches, evaluated against the canonical object's
/// `metadata.labels`.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub excluded_namespaces: Vec<String>,
    pub excluded_label_selectors: Vec<(String, String)>,
    pub exclude_daemonsets: bool,
}

impl ExportFilter {
    pub fn excludes(&self, kind: &Gvk, name: &NamespacedName, canonical: &Value) -> bool {
        if self.excluded_namespaces.iter().any(|ns| ns == &name.namespace) {
            return true;
        }
        if self.exclude_daemonsets && kind.kind == "DaemonSet" {
            return true;
        }
        if !self.excluded_label_selectors.is_empty() {
            let labels = canonical
                .get("metadata")
                .and_then(|m| m.get("labels"))
                .and_then(|l| l.as_object());
            if let Some(labels) = labels {
                for (key, value) in &self.excluded_label_selectors {
                    if labels.get(key).and_then(|v| v.as_str()) == Some(value.as_str()) {
                        return true;
                    }
                }
            }
        }
        false
    }
}
