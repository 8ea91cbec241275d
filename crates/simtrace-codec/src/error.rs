use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported trace schema version {0}")]
    UnsupportedVersion(u32),

    #[error("trace is corrupt: {0}")]
    TraceCorrupt(String),
}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::TraceCorrupt(e.to_string())
    }
}
