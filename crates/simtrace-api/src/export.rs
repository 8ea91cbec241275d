use axum::extract::State;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use simtrace_store::ExportFilter;

use crate::error::ApiError;
use crate::state::ExportState;

/// One route, `POST /export`, taking a JSON range and filter spec and
/// returning the encoded trace as an octet stream.
pub fn export_router(state: ExportState) -> Router {
    Router::new()
        .route("/export", post(post_export))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub start_ts: i64,
    pub end_ts: i64,
    #[serde(default)]
    pub filters: ExportFilters,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportFilters {
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,
    #[serde(default)]
    pub excluded_label_selectors: Vec<(String, String)>,
    #[serde(default)]
    pub exclude_daemonsets: bool,
}

impl From<ExportFilters> for ExportFilter {
    fn from(f: ExportFilters) -> Self {
        ExportFilter {
            excluded_namespaces: f.excluded_namespaces,
            excluded_label_selectors: f.excluded_label_selectors,
            exclude_daemonsets: f.exclude_daemonsets,
        }
    }
}

async fn post_export(
    State(state): State<ExportState>,
    axum::Json(req): axum::Json<ExportRequest>,
) -> Result<Vec<u8>, ApiError> {
    let filter: ExportFilter = req.filters.into();
    let trace = state.store.export(req.start_ts, req.end_ts, &filter).await?;
    let bytes = simtrace_codec::encode(&trace)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use simtrace_core::{Gvk, TrackedKindConfig, TrackerConfig};
    use simtrace_store::ObjectStore;
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let mut tracked_objects = std::collections::HashMap::new();
        tracked_objects.insert(
            Gvk::new("apps", "v1", "Deployment"),
            TrackedKindConfig { pod_spec_template_paths: vec![], track_lifecycle: true },
        );
        let store = ObjectStore::new(TrackerConfig { tracked_objects });
        export_router(ExportState { store })
    }

    #[tokio::test]
    async fn export_with_empty_store_returns_a_decodable_trace() {
        let app = test_app();
        let body = serde_json::json!({"start_ts": 0, "end_ts": 100}).to_string();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/export")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let trace = simtrace_codec::decode(&bytes).unwrap();
        assert!(trace.events.is_empty());
    }

    #[tokio::test]
    async fn invalid_range_returns_400() {
        let app = test_app();
        let body = serde_json::json!({"start_ts": 100, "end_ts": 0}).to_string();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/export")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
