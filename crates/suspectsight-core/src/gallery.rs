//! Known-face gallery: an immutable snapshot of (label, encoding) pairs.
//!
//! A gallery is built once from a directory of reference photos, one face per
//! photo, labelled with the file stem. Rebuilding produces a new snapshot;
//! nothing ever mutates an existing one.

use crate::pool::{AnalyzerPool, PoolError};
use crate::recognize::RecognizeError;
use crate::types::{Encoding, MatchSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const REFERENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery directory {path}: {source}")]
    ReadDir {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// One reference face.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownFace {
    pub label: String,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    faces: Vec<KnownFace>,
}

impl Gallery {
    pub fn new(faces: Vec<KnownFace>) -> Self {
        Self { faces }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn faces(&self) -> &[KnownFace] {
        &self.faces
    }

    /// The known face `probe` resolves to under `settings`, with its similarity.
    pub fn identify(&self, probe: &Encoding, settings: MatchSettings) -> Option<(&KnownFace, f32)> {
        let pick = settings
            .policy
            .select(probe, self.faces.iter().map(|f| &f.encoding), settings.threshold)?;
        self.faces.get(pick.index).map(|face| (face, pick.similarity))
    }

    /// Build a gallery from every reference photo in `dir`, in file-name order.
    ///
    /// Photos that cannot be read or decoded, or that contain no face, are skipped.
    pub async fn load_dir(dir: &Path, pool: &AnalyzerPool) -> Result<Self, GalleryError> {
        let paths = reference_images(dir)?;

        // At most one file per worker is held in memory at a time.
        let permits = Arc::new(Semaphore::new(pool.workers()));
        let mut tasks = JoinSet::new();
        for (position, path) in paths.into_iter().enumerate() {
            let pool = pool.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (position, path, Err(None));
                };
                let outcome = match tokio::fs::read(&path).await {
                    Ok(bytes) => pool.encode_first(bytes).await.map_err(Some),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable reference image");
                        Err(None)
                    }
                };
                (position, path, outcome)
            });
        }

        let mut loaded: Vec<(usize, KnownFace)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((position, path, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(Some(encoding)) => {
                    if let Some(label) = label_for(&path) {
                        loaded.push((position, KnownFace { label, encoding }));
                    }
                }
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "no face detected in reference image; skipping");
                }
                Err(Some(PoolError::Recognize(RecognizeError::Decode(e)))) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable reference image");
                }
                Err(Some(e)) => return Err(e.into()),
                Err(None) => {}
            }
        }

        loaded.sort_by_key(|(position, _)| *position);
        let gallery = Self::new(loaded.into_iter().map(|(_, face)| face).collect());

        tracing::info!(dir = %dir.display(), known_faces = gallery.len(), "gallery loaded");
        Ok(gallery)
    }
}

/// Reference photos in `dir` (`.jpg`, `.jpeg`, `.png`), sorted by file name.
pub fn reference_images(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let read_err = |source: std::io::Error| GalleryError::ReadDir {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let accepted = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| REFERENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if accepted {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Gallery label for a reference photo: its file name without the extension.
pub fn label_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, PixelAnalyzer};
    use crate::types::MatchPolicy;

    fn known(label: &str, values: &[f32]) -> KnownFace {
        KnownFace {
            label: label.to_string(),
            encoding: Encoding::new(values.to_vec()),
        }
    }

    #[test]
    fn test_identify_first_match() {
        let gallery = Gallery::new(vec![known("bob", &[0.0, 1.0]), known("alice", &[1.0, 0.0])]);
        let (face, similarity) = gallery
            .identify(&Encoding::new(vec![1.0, 0.1]), MatchSettings::default())
            .unwrap();
        assert_eq!(face.label, "alice");
        assert!(similarity > 0.9);
    }

    #[test]
    fn test_identify_empty_gallery() {
        let settings = MatchSettings { threshold: 0.1, policy: MatchPolicy::Closest };
        assert!(Gallery::default().identify(&Encoding::new(vec![1.0]), settings).is_none());
    }

    #[test]
    fn test_reference_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zoe.png", "adam.JPG", "notes.txt", "mia.jpeg", "noext"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = reference_images(dir.path())
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["adam.JPG", "mia.jpeg", "zoe.png"]);
    }

    #[test]
    fn test_reference_images_missing_dir() {
        let err = reference_images(Path::new("/nonexistent/gallery")).unwrap_err();
        assert!(matches!(err, GalleryError::ReadDir { .. }));
    }

    #[test]
    fn test_label_is_file_stem() {
        assert_eq!(label_for(Path::new("images/Barack Obama.jpg")).as_deref(), Some("Barack Obama"));
    }

    #[tokio::test]
    async fn test_load_dir_skips_faceless_and_broken_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("carol.png"), png_bytes([0, 0, 200], 16, 16)).unwrap();
        std::fs::write(dir.path().join("alice.png"), png_bytes([200, 0, 0], 16, 16)).unwrap();
        std::fs::write(dir.path().join("blank.png"), png_bytes([0, 0, 0], 16, 16)).unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let pool = AnalyzerPool::spawn(2, None, |_| Ok(PixelAnalyzer::default())).unwrap();
        let gallery = Gallery::load_dir(dir.path(), &pool).await.unwrap();

        let labels: Vec<&str> = gallery.faces().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["alice", "carol"]);
        assert_eq!(gallery.faces()[0].encoding, Encoding::new(vec![200.0, 0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_load_dir_with_more_files_than_workers() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12u8 {
            std::fs::write(dir.path().join(format!("person{i:02}.png")), png_bytes([10 + i, 20, 30], 8, 8)).unwrap();
        }

        let analyzer = PixelAnalyzer::default();
        let worker = analyzer.clone();
        let pool = AnalyzerPool::spawn(1, None, move |_| Ok(worker.clone())).unwrap();
        let gallery = Gallery::load_dir(dir.path(), &pool).await.unwrap();

        assert_eq!(gallery.len(), 12);
        assert_eq!(gallery.faces()[0].label, "person00");
        assert_eq!(gallery.faces()[11].label, "person11");
        assert_eq!(gallery.faces()[11].encoding, Encoding::new(vec![21.0, 20.0, 30.0]));
        assert_eq!(analyzer.calls(), 12);
    }
}
