use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("store error: {0}")]
    Store(#[from] simtrace_store::StoreError),

    #[error("{kind} is not a tracked kind")]
    UntrackedKind { kind: String },

    #[error("ownership chain for {pod} did not resolve within the retry budget")]
    OwnershipUnresolved { pod: String },
}
