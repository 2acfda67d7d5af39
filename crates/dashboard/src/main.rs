use anyhow::{Context, Result};
use dashboard::host::{CloudinaryHost, DirectoryHost, ImageHost};
use dashboard::session::spawn_expired_deletion;
use dashboard::store::UserStore;
use dashboard::{router, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use suspectsight_core::{AnalyzerPool, OnnxAnalyzer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "dashboard starting");

    let store = UserStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open user store at {}", config.db_path.display()))?;

    spawn_expired_deletion(store.sessions(), Duration::from_secs(60));

    let (host, media_dir) = match config.cloudinary.clone() {
        Some(credentials) => {
            tracing::info!(cloud = %credentials.cloud_name, "hosting uploads on cloudinary");
            let host: Arc<dyn ImageHost> = Arc::new(
                CloudinaryHost::new(credentials, config.upload_timeout).context("failed to build cloudinary client")?,
            );
            (host, None)
        }
        None => {
            tracing::warn!(dir = %config.media_dir.display(), "cloudinary not configured; hosting uploads locally");
            let host: Arc<dyn ImageHost> = Arc::new(
                DirectoryHost::new(config.media_dir.clone()).context("failed to prepare media directory")?,
            );
            (host, Some(config.media_dir.clone()))
        }
    };

    let paths = config.model_paths();
    let pool = AnalyzerPool::spawn(config.workers, None, |_| OnnxAnalyzer::load(&paths))
        .context("failed to start analyzer workers")?;

    let state = Arc::new(AppState::new(store, host, pool, config.matching));
    let app = router(state, media_dir, config.max_upload_bytes, config.sessions);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(bind = %config.bind, "dashboard ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("dashboard shutting down");
    Ok(())
}
