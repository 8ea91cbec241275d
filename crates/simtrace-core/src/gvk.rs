use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A tracked resource kind, identified by `(group, version, kind)`.
///
/// Displays and parses as `group/version.Kind`, matching the wire format
/// used for `Trace::config` and `Kind Index` keys. The core group is the
/// empty string, which renders as a leading `/` (e.g. `/v1.Pod`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.group, self.version, self.kind)
    }
}

impl FromStr for Gvk {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group_version, kind) = s
            .rsplit_once('.')
            .ok_or_else(|| CoreError::MalformedKind(s.to_string()))?;
        let (group, version) = group_version
            .split_once('/')
            .ok_or_else(|| CoreError::MalformedKind(s.to_string()))?;
        if kind.is_empty() || version.is_empty() {
            return Err(CoreError::MalformedKind(s.to_string()));
        }
        Ok(Gvk::new(group, version, kind))
    }
}

impl TryFrom<String> for Gvk {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Gvk> for String {
    fn from(gvk: Gvk) -> String {
        gvk.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let gvk = Gvk::new("apps", "v1", "Deployment");
        assert_eq!(gvk.to_string(), "apps/v1.Deployment");
        assert_eq!("apps/v1.Deployment".parse::<Gvk>().unwrap(), gvk);
    }

    #[test]
    fn core_group_is_empty_string() {
        let gvk = Gvk::new("", "v1", "Pod");
        assert_eq!(gvk.to_string(), "/v1.Pod");
        assert_eq!("/v1.Pod".parse::<Gvk>().unwrap(), gvk);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("not-a-kind".parse::<Gvk>().is_err());
        assert!("apps/v1".parse::<Gvk>().is_err());
    }
}
