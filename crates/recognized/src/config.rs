use std::path::PathBuf;
use suspectsight_core::{default_model_dir, MatchPolicy, MatchSettings, ModelPaths, DEFAULT_MATCH_THRESHOLD};

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of reference photos; each file stem becomes a label.
    pub gallery_dir: PathBuf,
    /// Number of analyzer worker threads.
    pub workers: usize,
    /// Threshold and policy for matching faces against the gallery.
    pub matching: MatchSettings,
    /// TrueType font for labels, replacing the bundled one.
    pub font_path: Option<PathBuf>,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `RECOGNIZE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let policy = match get("RECOGNIZE_MATCH_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to first-match policy");
                MatchPolicy::FirstMatch
            }),
            None => MatchPolicy::FirstMatch,
        };

        let default_workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        Self {
            bind: get("RECOGNIZE_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            model_dir: get("SUSPECTSIGHT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_model_dir),
            gallery_dir: get("RECOGNIZE_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("images")),
            workers: parse_or(&get, "RECOGNIZE_WORKERS", default_workers).max(1),
            matching: MatchSettings {
                threshold: parse_or(&get, "RECOGNIZE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
                policy,
            },
            font_path: get("RECOGNIZE_FONT_PATH").map(PathBuf::from),
            max_upload_bytes: parse_or(&get, "RECOGNIZE_MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind, "0.0.0.0:8000");
        assert_eq!(config.gallery_dir, PathBuf::from("images"));
        assert_eq!(config.matching, MatchSettings::default());
        assert!(config.workers >= 1);
        assert!(config.font_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RECOGNIZE_BIND", "127.0.0.1:9000"),
            ("SUSPECTSIGHT_MODEL_DIR", "/srv/models"),
            ("RECOGNIZE_WORKERS", "3"),
            ("RECOGNIZE_MATCH_THRESHOLD", "0.55"),
            ("RECOGNIZE_MATCH_POLICY", "closest"),
        ]);
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.workers, 3);
        assert_eq!(config.matching.policy, MatchPolicy::Closest);
        assert!((config.matching.threshold - 0.55).abs() < 1e-6);
        assert_eq!(config.model_paths().detector, PathBuf::from("/srv/models/det_10g.onnx"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("RECOGNIZE_WORKERS", "0"),
            ("RECOGNIZE_MATCH_THRESHOLD", "high"),
            ("RECOGNIZE_MATCH_POLICY", "nearest"),
        ]);
        assert_eq!(config.workers, 1);
        assert_eq!(config.matching, MatchSettings::default());
    }
}
