//! HTTP endpoints
//!
//! - `GET /status`: readiness answer used by availability probes
//! - `POST /upload`: multipart upload, file in the `file` field
//! - `GET /metrics`: Prometheus text, only when a handle is configured

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use filedrop_core::{
    types::{STATUS_OK, STATUS_SUCCESS},
    StatusResponse, UploadResponse,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::storage::UploadStore;

/// Multipart field carrying the file
pub const UPLOAD_FIELD: &str = "file";

/// Allowance for multipart framing on top of the file size limit
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Shared state of the receiver routes
#[derive(Clone)]
pub struct ReceiverState {
    /// Name reported by `/status`
    pub server_name: Arc<str>,

    /// Destination of uploads
    pub store: Arc<UploadStore>,

    /// Renders `/metrics` when set
    pub metrics: Option<PrometheusHandle>,
}

impl ReceiverState {
    pub fn new(server_name: impl Into<Arc<str>>, store: UploadStore) -> Self {
        Self {
            server_name: server_name.into(),
            store: Arc::new(store),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Builds the receiver router
pub fn router(state: ReceiverState) -> Router {
    let body_limit = state.store.max_bytes().saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let mut app = Router::new()
        .route("/status", get(status))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        );

    if state.metrics.is_some() {
        app = app.route("/metrics", get(render_metrics));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /status
async fn status(State(state): State<ReceiverState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: STATUS_OK.to_string(),
        server_name: state.server_name.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// POST /upload
async fn upload(
    State(state): State<ReceiverState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let outcome = receive_file(&state.store, &mut multipart).await;

    let label = match &outcome {
        Ok(_) => "success",
        Err(ApiError::BadRequest(_)) => "bad_request",
        Err(ApiError::PayloadTooLarge(_)) => "too_large",
        Err(ApiError::Storage(_)) => "storage_error",
    };
    metrics::counter!("filedrop_receiver_uploads_total", "outcome" => label).increment(1);

    let file = outcome?;
    metrics::counter!("filedrop_receiver_bytes_total").increment(file.size);
    info!(
        file = %file.original_name,
        size = file.size,
        path = %file.path,
        "File uploaded successfully"
    );

    Ok(Json(UploadResponse {
        status: STATUS_SUCCESS.to_string(),
        message: "File uploaded successfully".to_string(),
        file,
    }))
}

async fn receive_file(
    store: &UploadStore,
    multipart: &mut Multipart,
) -> Result<filedrop_core::FileInfo, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let mut pending = store.create(&original_name).await?;

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            pending.write(&chunk).await?;
        }
        return pending.finish().await;
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %e, "Upload exceeds body limit");
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// GET /metrics
async fn render_metrics(State(state): State<ReceiverState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const BOUNDARY: &str = "filedrop-test-boundary";

    fn state(dir: &std::path::Path, max_bytes: u64) -> ReceiverState {
        ReceiverState::new("test-host", UploadStore::new(dir, max_bytes))
    }

    fn multipart_request(field: &str, file_name: &str, contents: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path(), 1024))
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["serverName"], "test-host");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_upload() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path(), 1024))
            .oneshot(multipart_request("file", "notes.txt", b"some notes"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "File uploaded successfully");
        assert_eq!(body["file"]["originalName"], "notes.txt");
        assert_eq!(body["file"]["size"], 10);

        let path = body["file"]["path"].as_str().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"some notes");
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path(), 1024))
            .oneshot(multipart_request("other", "notes.txt", b"some notes"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path(), 16))
            .oneshot(multipart_request("file", "big.bin", &[7u8; 64]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["status"], "error");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_route_requires_handle() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path(), 1024))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
