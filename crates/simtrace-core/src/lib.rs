pub mod canonical;
pub mod clock;
pub mod error;
pub mod gvk;
pub mod hash;
pub mod lifecycle;
pub mod path;
pub mod timeline;
pub mod trace;

pub use canonical::{canonicalize, canonicalize_pod_spec, CanonicalObject};
pub use clock::now_ts;
pub use error::CoreError;
pub use gvk::Gvk;
pub use hash::{content_hash, ContentHash};
pub use lifecycle::{LifecycleInterval, PodLifecycleTable};
pub use path::TemplatePath;
pub use timeline::{KindIndex, NamespacedName, TimelineEvent};
pub use trace::{Trace, TrackedKindConfig, TrackerConfig, CURRENT_SCHEMA_VERSION};
