use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("template path '{path}' not reachable on kind {kind}")]
    TemplatePathUnreachable { kind: String, path: String },

    #[error("template path '{0}' expected an array at this segment")]
    NotAnArray(String),

    #[error("malformed kind string: {0}")]
    MalformedKind(String),

    #[error("malformed template path: {0}")]
    MalformedPath(String),
}
