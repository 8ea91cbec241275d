use std::path::Path;

use simtrace_core::{Gvk, TemplatePath, TrackedKindConfig, TrackerConfig};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawTrackerConfig;

/// Load and validate the tracker config file at `path`.
///
/// Validation here covers syntax only (well-formed kind strings, well-formed
/// template paths); whether a path is actually reachable on an observed
/// object of that kind can only be checked once the watch fabric has seen
/// one, and is surfaced there as a startup-fatal `ConfigInvalid`.
pub fn load_tracker_config(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawTrackerConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    debug!(path = %path.display(), kinds = raw.tracked_objects.len(), "loaded tracker config");

    let mut tracked_objects = std::collections::HashMap::new();
    for (kind_str, raw_kind) in raw.tracked_objects {
        let gvk: Gvk = kind_str.parse().map_err(ConfigError::Core)?;
        let pod_spec_template_paths = raw_kind
            .pod_spec_template_paths
            .iter()
            .map(|s| TemplatePath::parse(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::Core)?;
        tracked_objects.insert(
            gvk,
            TrackedKindConfig {
                pod_spec_template_paths,
                track_lifecycle: raw_kind.track_lifecycle,
            },
        );
    }

    Ok(TrackerConfig { tracked_objects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_well_formed_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "trackedObjects:\n  apps/v1.Deployment:\n    podSpecTemplatePaths: [spec.template]\n    trackLifecycle: true\n"
        )
        .unwrap();

        let config = load_tracker_config(file.path()).unwrap();
        let gvk = Gvk::new("apps", "v1", "Deployment");
        let kind_config = config.get(&gvk).unwrap();
        assert!(kind_config.track_lifecycle);
        assert_eq!(kind_config.pod_spec_template_paths.len(), 1);
    }

    #[test]
    fn rejects_malformed_kind_string() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "trackedObjects:\n  not-a-kind:\n    podSpecTemplatePaths: [spec.template]\n    trackLifecycle: false\n"
        )
        .unwrap();

        assert!(load_tracker_config(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_tracker_config(Path::new("/nonexistent/tracker.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
