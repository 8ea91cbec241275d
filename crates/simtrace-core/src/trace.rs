use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gvk::Gvk;
use crate::lifecycle::PodLifecycleTable;
use crate::path::TemplatePath;
use crate::timeline::{KindIndex, TimelineEvent};

/// Current trace schema version. Bumping this is required whenever the
/// content-hashing algorithm or the wire layout changes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Per-kind tracker configuration: where pod templates live, and whether
/// pods owned by this kind should be tracked in the lifecycle table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedKindConfig {
    pub pod_spec_template_paths: Vec<TemplatePath>,
    pub track_lifecycle: bool,
}

/// The full tracker configuration, keyed by tracked kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub tracked_objects: HashMap<Gvk, TrackedKindConfig>,
}

impl TrackerConfig {
    pub fn get(&self, kind: &Gvk) -> Option<&TrackedKindConfig> {
        self.tracked_objects.get(kind)
    }
}

/// `{schema-version, tracker-config, timeline, Kind Index, Pod Lifecycle
/// Table}` — the complete store snapshot, as encoded by the trace codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub version: u32,
    pub config: TrackerConfig,
    pub events: Vec<TimelineEvent>,
    pub index: KindIndex,
    pub pod_lifecycles: PodLifecycleTable,
}

impl Trace {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            config,
            events: Vec::new(),
            index: KindIndex::new(),
            pod_lifecycles: PodLifecycleTable::new(),
        }
    }

    pub fn min_ts(&self) -> Option<i64> {
        self.events.iter().map(|e| e.ts).min()
    }

    pub fn max_ts(&self) -> Option<i64> {
        self.events.iter().map(|e| e.ts).max()
    }
}
