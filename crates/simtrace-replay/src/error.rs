use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("trace decode failed: {0}")]
    Codec(#[from] simtrace_codec::CodecError),

    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("object {namespace}/{name} failed validation: {reason}")]
    Validation { namespace: String, name: String, reason: String },

    #[error("replay engine is in a terminal state")]
    AlreadyTerminal,
}
