//! HTTP surface for both halves of the system: the export endpoint served
//! by the tracer process, and the admission mutator served by the driver
//! process over TLS. The two routers share nothing at runtime other than
//! the axum/tower-http idiom they're built with.

pub mod error;
pub mod export;
pub mod mutate;
pub mod state;

pub use error::ApiError;
pub use export::{export_router, ExportFilters, ExportRequest};
pub use mutate::{mutate_router, MutateState};
pub use state::ExportState;
