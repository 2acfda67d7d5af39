use crate::session::SessionSettings;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use suspectsight_core::{data_dir, default_model_dir, MatchSettings, ModelPaths};

/// Dashboard configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8501).
    pub bind: String,
    /// SQLite database holding users and their uploaded records.
    pub db_path: PathBuf,
    /// Where uploads are kept when no Cloudinary account is configured.
    pub media_dir: PathBuf,
    pub model_dir: PathBuf,
    /// Number of analyzer worker threads.
    pub workers: usize,
    pub matching: MatchSettings,
    pub cloudinary: Option<CloudinaryCredentials>,
    /// Timeout for a single image-host request.
    pub upload_timeout: Duration,
    pub max_upload_bytes: usize,
    pub sessions: SessionSettings,
}

/// Account used to sign uploads to Cloudinary.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load configuration from `DASHBOARD_*` and `CLOUDINARY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = MatchSettings::default();
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        // All three values or nothing.
        let cloudinary = match (
            non_empty("CLOUDINARY_CLOUD_NAME"),
            non_empty("CLOUDINARY_API_KEY"),
            non_empty("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryCredentials {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Self {
            bind: get("DASHBOARD_BIND").unwrap_or_else(|| "0.0.0.0:8501".to_string()),
            db_path: get("DASHBOARD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir().join("users.db")),
            media_dir: get("DASHBOARD_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir().join("media")),
            model_dir: get("SUSPECTSIGHT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_model_dir),
            workers: parse_or(&get, "DASHBOARD_WORKERS", 2).max(1),
            matching: MatchSettings {
                threshold: parse_or(&get, "DASHBOARD_MATCH_THRESHOLD", defaults.threshold),
                ..defaults
            },
            cloudinary,
            upload_timeout: Duration::from_secs(parse_or(&get, "DASHBOARD_UPLOAD_TIMEOUT_SECS", 30)),
            max_upload_bytes: parse_or(&get, "DASHBOARD_MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
            sessions: SessionSettings {
                idle_timeout: time::Duration::minutes(parse_or(&get, "DASHBOARD_SESSION_IDLE_MINS", 30i64).max(1)),
                secure_cookie: parse_or(&get, "DASHBOARD_SECURE_COOKIE", false),
            },
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
