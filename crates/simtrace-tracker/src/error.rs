use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("ownership resolution failed: {0}")]
    Watch(#[from] simtrace_watch::WatchError),
}
