use crate::host::HostError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::views;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use suspectsight_core::PoolError;
use thiserror::Error;

/// Failures the user cannot fix from the form. Rendered as an error page.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("image host: {0}")]
    Host(#[from] HostError),
    #[error("analyzer: {0}")]
    Pool(#[from] PoolError),
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("password hashing: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Multipart(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }
        (status, Html(views::error_page())).into_response()
    }
}
