use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalObject;
use crate::gvk::Gvk;

/// `namespace/name`, as used for `Kind Index` keys and lifecycle owner
/// identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One committed timeline entry. Invariant held by the store: for any
/// `(kind, namespaced-name)` key, events are chronologically ordered and no
/// two events for that key share a `ts` — a later write at an equal `ts`
/// replaces the earlier one within the same second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub ts: i64,
    pub applied: Vec<(Gvk, NamespacedName, CanonicalObject)>,
    pub deleted: Vec<(Gvk, NamespacedName, CanonicalObject)>,
    /// Set when the watch fabric dropped a watch event at this timestamp
    /// because the store's mutation queue was saturated. A gap marker
    /// carries no objects; it exists so a reader of the trace
    /// can tell "nothing happened" apart from "something was lost".
    #[serde(default)]
    pub gap: bool,
}

impl TimelineEvent {
    pub fn empty(ts: i64) -> Self {
        Self {
            ts,
            applied: Vec::new(),
            deleted: Vec::new(),
            gap: false,
        }
    }

    pub fn gap_marker(ts: i64) -> Self {
        Self {
            ts,
            applied: Vec::new(),
            deleted: Vec::new(),
            gap: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.deleted.is_empty() && !self.gap
    }
}

/// `kind -> (namespace/name -> content-hash)`. After applying any prefix of
/// the timeline, this is exactly the set of keys currently live, each
/// mapped to the hash of its last applied form.
pub type KindIndex = HashMap<Gvk, HashMap<NamespacedName, u64>>;
