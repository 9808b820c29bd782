//! HTTP surface (feature `server`).
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /generate` | JSON [`GenerateRequest`] → [`GeneratedThumbnail`] |
//! | `POST /upload-generate` | multipart upload (`file` plus the same fields as form fields) |
//! | `GET /static/{key}` | files written by [`LocalDelivery`](crate::LocalDelivery) |
//! | `GET /health` | liveness and model state |
//!
//! Errors are answered as `{"error": kind, "message": ..., "requires_explicit_timestamp": bool}`
//! with a status derived from [`ErrorKind`].

use std::{
    net::SocketAddr,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::{io::AsyncWriteExt, net::TcpListener};

use crate::{
    error::{ErrorKind, ThumbnailError},
    pipeline::{GeneratedThumbnail, Thumbnailer},
    request::GenerateRequest,
};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 1 << 30;

/// State shared by all routes.
#[derive(Debug, Clone)]
pub struct ServerState {
    thumbnailer: Arc<Thumbnailer>,
    static_root: Option<Arc<PathBuf>>,
}

impl ServerState {
    /// State around `thumbnailer`. With `static_root`, locally delivered files
    /// are served under `/static`.
    pub fn new(thumbnailer: Arc<Thumbnailer>, static_root: Option<PathBuf>) -> Self {
        Self {
            thumbnailer,
            static_root: static_root.map(Arc::new),
        }
    }
}

/// Build the router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/upload-generate", post(upload_generate))
        .route("/static/*key", get(serve_static))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind `addr` and serve until the process receives Ctrl-C.
///
/// # Errors
///
/// [`ThumbnailError::Io`] if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: ServerState) -> Result<(), ThumbnailError> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// A [`ThumbnailError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ThumbnailError);

impl From<ThumbnailError> for ApiError {
    fn from(error: ThumbnailError) -> Self {
        Self(error)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self(ThumbnailError::Io(error))
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self(ThumbnailError::InvalidRequest(format!("malformed upload: {error}")))
    }
}

/// HTTP status for an error category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Media => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ScoringUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Delivery => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::warn!("Request rejected: {}", self.0);
        }
        let body = json!({
            "error": kind.as_str(),
            "message": self.0.to_string(),
            "requires_explicit_timestamp": self.0.requires_explicit_timestamp(),
        });
        (status, Json(body)).into_response()
    }
}

async fn generate(
    State(state): State<ServerState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GeneratedThumbnail>, ApiError> {
    let request = body.into_request()?;
    Ok(Json(state.thumbnailer.generate(&request).await?))
}

async fn upload_generate(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<Json<GeneratedThumbnail>, ApiError> {
    let mut upload: Option<tempfile::TempPath> = None;
    let mut body = GenerateRequest::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let suffix = field
                .file_name()
                .and_then(|file_name| FsPath::new(file_name).extension())
                .map(|extension| format!(".{}", extension.to_string_lossy()))
                .unwrap_or_else(|| ".mp4".to_string());
            let spool = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile()?;
            let mut file = tokio::fs::File::from_std(spool.reopen()?);
            let mut size = 0usize;
            while let Some(chunk) = field.chunk().await? {
                size += chunk.len();
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            log::debug!("Spooled {size} uploaded bytes to {}", spool.path().display());
            upload = Some(spool.into_temp_path());
            continue;
        }

        let value = field.text().await?;
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "prompt" => body.prompt = Some(value.to_string()),
            "time" | "timestamp" => body.time = Some(parse_field(&name, value)?),
            "title" => body.title = Some(value.to_string()),
            "width" => body.width = Some(parse_field(&name, value)?),
            "height" => body.height = Some(parse_field(&name, value)?),
            "key_prefix" => body.key_prefix = Some(value.to_string()),
            "sample_count" => body.sample_count = Some(parse_field(&name, value)?),
            other => log::warn!("Ignoring unknown upload field {other:?}"),
        }
    }

    let Some(upload) = upload else {
        return Err(ThumbnailError::InvalidRequest("missing \"file\" field".to_string()).into());
    };
    body.video_url = upload.to_string_lossy().into_owned();
    let request = body.into_request()?;
    let result = state.thumbnailer.generate(&request).await;
    // Removes the spooled upload.
    drop(upload);
    Ok(Json(result?))
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ThumbnailError> {
    value
        .parse()
        .map_err(|_| ThumbnailError::InvalidRequest(format!("field {name:?} has invalid value {value:?}")))
}

async fn serve_static(State(state): State<ServerState>, Path(key): Path<String>) -> Response {
    let Some(root) = &state.static_root else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if key.split('/').any(|segment| segment == ".." || segment.is_empty()) || key.contains('\\') {
        log::warn!("Rejected static path {key:?}");
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    }

    let path = key.split('/').fold(root.as_ref().clone(), |path, segment| path.join(segment));
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = match path.extension().and_then(|extension| extension.to_str()) {
                Some("jpg" | "jpeg") => "image/jpeg",
                _ => "application/octet-stream",
            };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "public, max-age=86400"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(error) => {
            log::warn!("Failed to read {}: {error}", path.display());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model_loaded": state.thumbnailer.model().is_loaded(),
        "delivery": state.thumbnailer.delivery().name(),
    }))
}
