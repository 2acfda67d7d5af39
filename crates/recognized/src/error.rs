use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use suspectsight_core::{GalleryError, PoolError, RecognizeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid image format")]
    InvalidImageFormat,
    #[error("Missing image upload")]
    MissingImage,
    #[error("Could not decode image")]
    Undecodable,
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("recognition failed: {0}")]
    Pool(PoolError),
    #[error("gallery reload failed: {0}")]
    Gallery(#[from] GalleryError),
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Recognize(RecognizeError::Decode(_)) => Self::Undecodable,
            other => Self::Pool(other),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidImageFormat | Self::MissingImage | Self::Undecodable | Self::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Pool(_) | Self::Gallery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
