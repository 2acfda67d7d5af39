//! dashboard: role-based web app over the SuspectSight user store.
//!
//! Admins upload suspect photos with details, Officers look a face up
//! against every stored photo, Administrators manage accounts.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use suspectsight_core::{AnalyzerPool, MatchSettings};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod host;
pub mod password;
pub mod routes;
pub mod session;
pub mod store;
pub mod views;

pub use config::Config;

use host::{ImageHost, MEDIA_PREFIX};
use session::{session_layer, SessionSettings};
use store::UserStore;

/// State shared by all handlers.
pub struct AppState {
    pub store: UserStore,
    pub host: Arc<dyn ImageHost>,
    pub pool: AnalyzerPool,
    pub matching: MatchSettings,
}

impl AppState {
    pub fn new(store: UserStore, host: Arc<dyn ImageHost>, pool: AnalyzerPool, matching: MatchSettings) -> Self {
        Self {
            store,
            host,
            pool,
            matching,
        }
    }
}

/// Build the dashboard router. `media_dir` is served under `/media` when
/// uploads are hosted locally. Sessions live in the state's user store.
pub fn router(
    state: Arc<AppState>,
    media_dir: Option<PathBuf>,
    max_upload_bytes: usize,
    sessions: SessionSettings,
) -> Router {
    let sessions = session_layer(state.store.sessions(), sessions);
    let mut app = Router::new()
        .route("/", get(routes::index))
        .route("/signup", post(routes::signup))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/admin/upload", post(routes::admin_upload))
        .route("/officer/lookup", post(routes::officer_lookup))
        .route("/administrator/users", post(routes::add_user))
        .route("/administrator/users/remove", post(routes::remove_user))
        .layer(sessions)
        .with_state(state);

    if let Some(dir) = media_dir {
        app = app.nest_service(MEDIA_PREFIX, ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
