use simtrace_store::ObjectStore;

#[derive(Clone)]
pub struct ExportState {
    pub store: ObjectStore,
}
