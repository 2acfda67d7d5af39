//! recognized: HTTP face recognition against a fixed gallery of known faces.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use suspectsight_core::{AnalyzerPool, Gallery, MatchSettings};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod routes;

pub use config::Config;

/// State shared by all handlers.
pub struct AppState {
    pub pool: AnalyzerPool,
    pub matching: MatchSettings,
    pub gallery_dir: PathBuf,
    /// Current gallery snapshot. Requests clone the `Arc` and keep using the
    /// snapshot they started with even if a reload swaps in a new one.
    gallery: RwLock<Arc<Gallery>>,
}

impl AppState {
    pub fn new(pool: AnalyzerPool, gallery: Gallery, gallery_dir: PathBuf, matching: MatchSettings) -> Self {
        Self {
            pool,
            matching,
            gallery_dir,
            gallery: RwLock::new(Arc::new(gallery)),
        }
    }

    pub async fn gallery(&self) -> Arc<Gallery> {
        Arc::clone(&*self.gallery.read().await)
    }

    pub async fn replace_gallery(&self, gallery: Gallery) {
        *self.gallery.write().await = Arc::new(gallery);
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/recognize/", post(routes::recognize))
        .route("/gallery/reload", post(routes::reload_gallery))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use suspectsight_core::testing::{multipart_body, multipart_content_type, png_bytes, FormPart, PixelAnalyzer};
    use suspectsight_core::{Encoding, KnownFace};
    use tower::ServiceExt;

    fn app_with(analyzer: &PixelAnalyzer, gallery: Gallery, gallery_dir: PathBuf) -> Router {
        let analyzer = analyzer.clone();
        let pool = AnalyzerPool::spawn(1, None, move |_| Ok(analyzer.clone())).unwrap();
        let state = Arc::new(AppState::new(pool, gallery, gallery_dir, MatchSettings::default()));
        router(state, 1024 * 1024)
    }

    fn alice_gallery() -> Gallery {
        Gallery::new(vec![KnownFace {
            label: "alice".into(),
            encoding: Encoding::new(vec![220.0, 30.0, 30.0]),
        }])
    }

    fn upload(content_type: &str, data: &[u8]) -> Request<Body> {
        let body = multipart_body(&[FormPart::File {
            name: "image",
            filename: "upload",
            content_type,
            data,
        }]);
        Request::builder()
            .method("POST")
            .uri("/recognize/")
            .header("content-type", multipart_content_type())
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_non_image_content_type_without_analyzing() {
        let analyzer = PixelAnalyzer::default();
        let app = app_with(&analyzer, alice_gallery(), PathBuf::from("unused"));

        for content_type in ["image/gif", "text/plain", "application/octet-stream"] {
            let response = app
                .clone()
                .oneshot(upload(content_type, &png_bytes([220, 30, 30], 16, 16)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["detail"], "Invalid image format");
        }
        assert_eq!(analyzer.calls(), 0);
    }

    /// Near-white pixels in the label bar of the face `PixelAnalyzer` reports
    /// for a 200x200 photo: box (50, 50) to (150, 150), bar from y = 115.
    fn label_text_pixels(jpeg: &[u8]) -> usize {
        let decoded = image::load_from_memory(jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (200, 200));
        (118..=148)
            .flat_map(|y| (52..=148).map(move |x| (x, y)))
            .filter(|&(x, y)| decoded.get_pixel(x, y).0.iter().all(|&c| c > 160))
            .count()
    }

    #[tokio::test]
    async fn test_known_face_returns_labelled_jpeg() {
        let analyzer = PixelAnalyzer::default();
        let app = app_with(&analyzer, alice_gallery(), PathBuf::from("unused"));

        let response = app.oneshot(upload("image/png", &png_bytes([220, 30, 30], 200, 200))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");
        assert_eq!(response.headers()[routes::FACE_COUNT_HEADER], "1");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(label_text_pixels(&body) > 20, "label text missing from the bar");
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_face_is_labelled_too() {
        let app = app_with(&PixelAnalyzer::default(), alice_gallery(), PathBuf::from("unused"));

        let response = app.oneshot(upload("image/png", &png_bytes([10, 10, 240], 200, 200))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(label_text_pixels(&body) > 20);
    }

    #[tokio::test]
    async fn test_missing_image_field() {
        let app = app_with(&PixelAnalyzer::default(), Gallery::default(), PathBuf::from("unused"));
        let body = multipart_body(&[FormPart::Text("photo", "nope")]);
        let request = Request::builder()
            .method("POST")
            .uri("/recognize/")
            .header("content-type", multipart_content_type())
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_bad_request() {
        let app = app_with(&PixelAnalyzer::default(), Gallery::default(), PathBuf::from("unused"));
        let response = app.oneshot(upload("image/jpeg", b"definitely not a jpeg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reload_swaps_gallery_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bob.png"), png_bytes([10, 10, 240], 16, 16)).unwrap();
        std::fs::write(dir.path().join("dana.png"), png_bytes([10, 240, 10], 16, 16)).unwrap();

        let app = app_with(&PixelAnalyzer::default(), alice_gallery(), dir.path().to_path_buf());

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(health.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["known_faces"], 1);

        let reload = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/gallery/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(reload.status(), StatusCode::OK);
        let body = to_bytes(reload.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["known_faces"], 2);
    }
}
