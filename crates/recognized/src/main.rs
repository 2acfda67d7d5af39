use anyhow::{Context, Result};
use recognized::{router, AppState, Config};
use std::sync::Arc;
use suspectsight_core::{AnalyzerPool, Gallery, LabelFont, OnnxAnalyzer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "recognized starting");

    let font = config.font_path.as_deref().and_then(|path| match LabelFont::load(path) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "label font unavailable; using bundled font");
            None
        }
    });

    let paths = config.model_paths();
    let pool = AnalyzerPool::spawn(config.workers, font, |_| OnnxAnalyzer::load(&paths))
        .context("failed to start analyzer workers")?;

    let gallery = Gallery::load_dir(&config.gallery_dir, &pool)
        .await
        .with_context(|| format!("failed to load gallery from {}", config.gallery_dir.display()))?;
    tracing::info!(known_faces = gallery.len(), workers = config.workers, "gallery loaded");

    let state = Arc::new(AppState::new(pool, gallery, config.gallery_dir.clone(), config.matching));
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(bind = %config.bind, "recognized ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("recognized shutting down");
    Ok(())
}
