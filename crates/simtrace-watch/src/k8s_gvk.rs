use simtrace_core::Gvk;

/// Convert a Kubernetes `apiVersion` (`"group/version"` or just `"version"`
/// for the core group) plus a `kind` into our own [`Gvk`]. This is distinct
/// from `Gvk`'s own `FromStr`, which parses the `group/version.Kind` wire
/// format rather than the two separate fields an `ownerReference` carries.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> Gvk {
    match api_version.split_once('/') {
        Some((group, version)) => Gvk::new(group, version, kind),
        None => Gvk::new("", api_version, kind),
    }
}

/// The inverse: the `apiVersion` string a tracked [`Gvk`] corresponds to,
/// for constructing `kube::core::GroupVersionKind` discovery lookups.
pub fn api_version_of(gvk: &Gvk) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_group_and_version() {
        let gvk = gvk_from_api_version("apps/v1", "Deployment");
        assert_eq!(gvk, Gvk::new("apps", "v1", "Deployment"));
    }

    #[test]
    fn core_group_has_no_slash() {
        let gvk = gvk_from_api_version("v1", "Pod");
        assert_eq!(gvk, Gvk::new("", "v1", "Pod"));
    }

    #[test]
    fn api_version_round_trips() {
        let gvk = Gvk::new("apps", "v1", "Deployment");
        assert_eq!(api_version_of(&gvk), "apps/v1");
        let core = Gvk::new("", "v1", "Pod");
        assert_eq!(api_version_of(&core), "v1");
    }
}
