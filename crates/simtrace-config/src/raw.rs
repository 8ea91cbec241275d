use std::collections::HashMap;

use serde::Deserialize;

/// The on-disk YAML shape of the tracker config file:
/// ```yaml
/// trackedObjects:
///   <group/version.Kind>:
///     podSpecTemplatePaths: [<json-path-with-*>]
///     trackLifecycle: <bool>
/// ```
#[derive(Debug, Deserialize)]
pub struct RawTrackerConfig {
    #[serde(rename = "trackedObjects")]
    pub tracked_objects: HashMap<String, RawTrackedKind>,
}

#[derive(Debug, Deserialize)]
pub struct RawTrackedKind {
    #[serde(rename = "podSpecTemplatePaths")]
    pub pod_spec_template_paths: Vec<String>,
    #[serde(rename = "trackLifecycle")]
    pub track_lifecycle: bool,
}
