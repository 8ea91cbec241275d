use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kind {0} is not configured for tracking")]
    UntrackedKind(String),

    #[error("invalid export range: end_ts < start_ts")]
    InvalidRange,

    #[error("snapshot could not be taken within the allotted time")]
    ExportUnavailable,

    #[error("core error: {0}")]
    Core(#[from] simtrace_core::CoreError),
}
