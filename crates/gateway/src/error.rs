use crate::chat::ChatError;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inference::InferenceError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("model not loaded")]
    ModelUnavailable(Option<String>),

    #[error("no file uploaded")]
    NoFile,

    #[error("invalid file")]
    InvalidFile,

    #[error("invalid upload")]
    Upload(#[from] MultipartError),

    #[error("no text provided")]
    NoText,

    #[error("inference failed")]
    Inference(#[source] InferenceError),

    #[error("internal")]
    Chat(#[from] ChatError),

    #[error("internal")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NoFile | ApiError::InvalidFile | ApiError::NoText => StatusCode::BAD_REQUEST,
            ApiError::Upload(e) => e.status(),
            ApiError::Inference(_) | ApiError::Chat(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::ModelUnavailable(detail) => detail.clone(),
            ApiError::Upload(e) => Some(e.body_text()),
            ApiError::Inference(e) => Some(e.to_string()),
            ApiError::Chat(e) => Some(e.to_string()),
            ApiError::Internal(e) => Some(format!("{e:#}")),
            ApiError::NoFile | ApiError::InvalidFile | ApiError::NoText => None,
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelUnavailable(detail) => ApiError::ModelUnavailable(Some(detail)),
            other => ApiError::Inference(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "Request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::ModelUnavailable(None).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::NoFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NoText.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Chat(ChatError::MissingApiKey).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unavailable_model_maps_to_503_with_detail() {
        let err: ApiError = InferenceError::ModelUnavailable("no .onnx in weights".into()).into();

        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.detail().as_deref(), Some("no .onnx in weights"));
    }

    #[test]
    fn test_other_inference_errors_map_to_500() {
        let err: ApiError = InferenceError::CheckpointNotFound("weights".into()).into();

        assert!(matches!(err, ApiError::Inference(_)));
        assert_eq!(err.to_string(), "inference failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
