//! Binary encode/decode of the complete store snapshot.
//!
//! The wire format is `bincode` over [`simtrace_core::Trace`] directly: its
//! five top-level fields (`version`, `config`, `events`, `index`,
//! `pod_lifecycles`) serialize in declaration order. `bincode` is used
//! specifically because it round-trips the `(Gvk, NamespacedName)` tuple
//! keys in `pod_lifecycles` without coercing them to strings, unlike a JSON
//! pivot.

pub mod error;

use simtrace_core::{Trace, CURRENT_SCHEMA_VERSION};

pub use error::CodecError;

/// Encode a trace to its canonical binary form.
pub fn encode(trace: &Trace) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(trace).map_err(CodecError::from)
}

/// Decode a trace, rejecting anything but the current schema version.
/// `version` is the struct's first field, and bincode's default
/// fixed-width little-endian integer encoding means it occupies exactly
/// the first four bytes — checked before the rest of the document is
/// parsed so a version mismatch never falls through to a confusing
/// deserialize error.
pub fn decode(bytes: &[u8]) -> Result<Trace, CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::TraceCorrupt("trace shorter than the version prefix".to_string()));
    }
    let version = u32::from_le_bytes(bytes[0..4].try_into().expect("checked len"));
    if version != CURRENT_SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    bincode::deserialize(bytes).map_err(CodecError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtrace_core::{
        lifecycle::{record_end, record_start},
        timeline::{KindIndex, NamespacedName, TimelineEvent},
        Gvk, TrackerConfig,
    };

    fn sample_trace() -> Trace {
        let mut trace = Trace::new(TrackerConfig::default());
        let kind = Gvk::new("apps", "v1", "Deployment");
        let name = NamespacedName::new("default", "web");

        let mut index = KindIndex::new();
        index.entry(kind.clone()).or_default().insert(name.clone(), 42);
        trace.index = index;

        trace.events.push(TimelineEvent::empty(100));
        record_start(&mut trace.pod_lifecycles, kind.clone(), name.clone(), 7, 10);
        record_end(&mut trace.pod_lifecycles, kind, name, 7, 40);
        trace
    }

    #[test]
    fn round_trips_a_trace_with_tuple_keyed_lifecycles() {
        let trace = sample_trace();
        let bytes = encode(&trace).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.version, trace.version);
        assert_eq!(decoded.events.len(), trace.events.len());
        assert_eq!(decoded.pod_lifecycles, trace.pod_lifecycles);
        assert_eq!(decoded.index, trace.index);
    }

    #[test]
    fn rejects_an_unsupported_version() {
        let mut trace = sample_trace();
        trace.version = 9999;
        let bytes = bincode::serialize(&trace).unwrap();
        assert!(matches!(decode(&bytes), Err(CodecError::UnsupportedVersion(9999))));
    }

    #[test]
    fn rejects_truncated_bytes() {
        assert!(matches!(decode(&[0, 1]), Err(CodecError::TraceCorrupt(_))));
    }

    #[test]
    fn rejects_garbage_bytes_of_sufficient_length() {
        let garbage = vec![2u8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(decode(&garbage).is_err());
    }
}
