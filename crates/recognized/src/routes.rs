use crate::error::ApiError;
use crate::AppState;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Instant;
use suspectsight_core::Gallery;

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Header carrying the number of faces drawn on the returned image.
pub const FACE_COUNT_HEADER: &str = "x-face-count";

/// Whether an upload's declared content type is one the service accepts.
fn is_accepted(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .is_some_and(|essence| ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()))
}

/// `POST /recognize/`: label every face in the `image` field and return a JPEG.
pub async fn recognize(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let started = Instant::now();

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        if !is_accepted(field.content_type()) {
            tracing::debug!(content_type = ?field.content_type(), "rejected upload");
            return Err(ApiError::InvalidImageFormat);
        }
        upload = Some(field.bytes().await?);
        break;
    }
    let bytes = upload.ok_or(ApiError::MissingImage)?;

    let gallery = state.gallery().await;
    let result = state.pool.recognize(bytes.to_vec(), gallery, state.matching).await?;

    tracing::info!(
        faces = result.faces.len(),
        known = result.faces.iter().filter(|f| f.is_known()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "recognized upload"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::HeaderName::from_static(FACE_COUNT_HEADER), result.faces.len().to_string()),
        ],
        Body::from(result.jpeg),
    )
        .into_response())
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "known_faces": state.gallery().await.len(),
        "workers": state.pool.workers(),
    }))
}

/// `POST /gallery/reload`: rebuild the gallery from disk and swap it in.
pub async fn reload_gallery(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let fresh = Gallery::load_dir(&state.gallery_dir, &state.pool).await?;
    let known_faces = fresh.len();
    state.replace_gallery(fresh).await;
    tracing::info!(known_faces, "gallery reloaded");
    Ok(Json(serde_json::json!({ "known_faces": known_faces })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_content_types() {
        assert!(is_accepted(Some("image/jpeg")));
        assert!(is_accepted(Some("image/PNG")));
        assert!(is_accepted(Some("image/png; charset=binary")));
        assert!(!is_accepted(Some("image/gif")));
        assert!(!is_accepted(Some("application/octet-stream")));
        assert!(!is_accepted(None));
    }
}
