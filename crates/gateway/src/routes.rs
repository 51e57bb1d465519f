use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::{allowed_file, secure_filename};
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use inference::CountsMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub counts_raw: CountsMap,
    /// Empty when no annotated image was produced
    pub annotated_image_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// API routes, annotated images under `/predicted`, and the frontend build
/// in `static_dir` for everything else.
pub fn router(state: AppState, static_dir: &Path, max_upload_bytes: usize) -> Router {
    let predicted = ServeDir::new(&state.output_dir);
    let frontend =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/chat", post(chat))
        .nest_service("/predicted", predicted)
        .fallback_service(frontend)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.model.is_loaded(),
        model_error: state.model.load_error().map(str::to_string),
    })
}

#[tracing::instrument(skip_all)]
async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let model = state.model.require()?;

    let mut multipart = multipart.map_err(|_| ApiError::NoFile)?;
    let (filename, data) = read_file_field(&mut multipart)
        .await?
        .ok_or(ApiError::NoFile)?;

    if filename.is_empty() || !allowed_file(&filename) {
        return Err(ApiError::InvalidFile);
    }
    let safe_name = secure_filename(&filename);
    if safe_name.is_empty() {
        return Err(ApiError::InvalidFile);
    }

    tokio::fs::create_dir_all(&state.temp_dir)
        .await
        .with_context(|| format!("creating {}", state.temp_dir.display()))?;
    let upload_dir = tempfile::Builder::new()
        .prefix("upload-")
        .tempdir_in(&state.temp_dir)
        .context("creating upload directory")?;
    let upload_path = upload_dir.path().join(&safe_name);
    tokio::fs::write(&upload_path, &data)
        .await
        .with_context(|| format!("saving upload {}", upload_path.display()))?;

    tracing::info!(file = %safe_name, bytes = data.len(), "Upload received");

    let pipeline = state.pipeline.clone();
    let output_dir = state.output_dir.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = pipeline.run_inference(&model, &upload_path, &output_dir);
        if let Err(e) = upload_dir.close() {
            tracing::debug!(error = %e, "Failed to remove upload");
        }
        outcome
    })
    .await
    .context("inference task aborted")??;

    let annotated_image_url = outcome
        .annotated_path
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| {
            format!(
                "{}/predicted/{}",
                public_base_url(&headers),
                name.to_string_lossy()
            )
        })
        .unwrap_or_default();

    Ok(Json(PredictResponse {
        counts_raw: outcome.counts,
        annotated_image_url,
    }))
}

/// First multipart field named `file`, with its client-side file name.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            return Ok(Some((filename, data)));
        }
    }
    Ok(None)
}

/// `scheme://host` as seen by the client.
fn public_base_url(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{scheme}://{host}")
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Json<ChatResponse>, ApiError> {
    // Malformed JSON is treated like a missing field
    let text = serde_json::from_slice::<ChatRequest>(&body)
        .ok()
        .and_then(|request| request.text)
        .filter(|text| !text.is_empty())
        .ok_or(ApiError::NoText)?;

    let reply = state.chat.reply(&text).await?;
    Ok(Json(ChatResponse { reply }))
}
