use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::Xxh3;

/// A 64-bit structural content hash. Equal canonical forms hash equal;
/// equal hashes are not proof of equality — treat collisions as "same
/// bucket", never as "same value".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub u64);

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash a JSON value's structural form: object keys are visited in sorted
/// order (so field insertion/serialization order never affects the hash),
/// arrays are visited in the given order (sequence order is meaningful).
/// Changing this algorithm is a breaking change — it requires a trace
/// schema-version bump.
pub fn content_hash(value: &Value) -> ContentHash {
    let mut hasher = Xxh3::new();
    hash_value(value, &mut hasher);
    ContentHash(hasher.digest())
}

fn hash_value(value: &Value, hasher: &mut Xxh3) {
    match value {
        Value::Null => hasher.update(b"\0n"),
        Value::Bool(b) => {
            hasher.update(b"\0b");
            hasher.update(&[*b as u8]);
        }
        Value::Number(n) => {
            hasher.update(b"\0i");
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"\0s");
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"\0a");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => {
            hasher.update(b"\0o");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(&(keys.len() as u64).to_le_bytes());
            for key in keys {
                hasher.update(&(key.len() as u64).to_le_bytes());
                hasher.update(key.as_bytes());
                hash_value(&map[key], hasher);
            }
        }
    }
}
