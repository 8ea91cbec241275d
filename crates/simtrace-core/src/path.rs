use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One segment of a [`TemplatePath`]: a map key, or `*` meaning "every
/// element of this array".
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Wildcard,
}

/// A JSON-path-like mini-DSL locating one or more pod templates within an
/// object, e.g. `spec.template` or `spec.jobTemplate.spec.template` or, with
/// a wildcard, `spec.templates.*.template`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplatePath {
    raw: String,
}

impl TemplatePath {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::MalformedPath(raw.to_string()));
        }
        // Validate eagerly so a malformed path fails at config-load time
        // rather than the first time it is resolved against an object.
        Self::segments_of(raw)?;
        Ok(Self { raw: raw.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segments_of(raw: &str) -> Result<Vec<Segment>, CoreError> {
        raw.split('.')
            .map(|part| {
                if part.is_empty() {
                    Err(CoreError::MalformedPath(raw.to_string()))
                } else if part == "*" {
                    Ok(Segment::Wildcard)
                } else {
                    Ok(Segment::Key(part.to_string()))
                }
            })
            .collect()
    }

    /// Resolve this path against `root`, returning mutable references to
    /// every matched template location. Returns
    /// [`CoreError::TemplatePathUnreachable`] if no location matches, and
    /// [`CoreError::NotAnArray`] if a `*` segment lands on a non-array.
    pub fn resolve_mut<'a>(&self, root: &'a mut Value, kind: &str) -> Result<Vec<&'a mut Value>, CoreError> {
        let segments = Self::segments_of(&self.raw).expect("validated at parse time");
        let mut frontier: Vec<&mut Value> = vec![root];
        for seg in &segments {
            let mut next = Vec::new();
            for node in frontier {
                match seg {
                    Segment::Key(key) => {
                        if let Some(child) = node.get_mut(key) {
                            next.push(child);
                        }
                    }
                    Segment::Wildcard => match node {
                        Value::Array(items) => next.extend(items.iter_mut()),
                        _ => {
                            return Err(CoreError::NotAnArray(self.raw.clone()));
                        }
                    },
                }
            }
            frontier = next;
            if frontier.is_empty() {
                return Err(CoreError::TemplatePathUnreachable {
                    kind: kind.to_string(),
                    path: self.raw.clone(),
                });
            }
        }
        Ok(frontier)
    }
}

impl TryFrom<String> for TemplatePath {
    type Error = CoreError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        TemplatePath::parse(&raw)
    }
}

impl From<TemplatePath> for String {
    fn from(path: TemplatePath) -> String {
        path.raw
    }
}
