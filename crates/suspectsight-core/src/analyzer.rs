//! The seam between the pipeline and the face model.
//!
//! Everything above this trait (gallery building, recognition, the worker
//! pool) only needs "find the faces and encode them"; the ONNX-backed
//! implementation lives here too.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Encoding};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A face located in a photo together with its encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub encoding: Encoding,
}

/// Locates and encodes faces.
pub trait FaceAnalyzer {
    /// Every face in `image`, most confident first.
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        (**self).analyze(image)
    }
}

/// Locations of the two ONNX model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
        }
    }
}

/// Model directory from `SUSPECTSIGHT_MODEL_DIR`, else `$XDG_DATA_HOME/suspectsight/models`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUSPECTSIGHT_MODEL_DIR") {
        return PathBuf::from(dir);
    }
    data_dir().join("models")
}

/// Per-user data directory shared by both applications.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("suspectsight")
}

/// SCRFD detection followed by ArcFace encoding of each detected face.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    pub fn load(paths: &ModelPaths) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&paths.detector.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&paths.recognizer.to_string_lossy())?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            match self.recognizer.encode(image, &bbox) {
                Ok(encoding) => faces.push(DetectedFace { bbox, encoding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir(Path::new("/opt/models"));
        assert_eq!(paths.detector, PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(paths.recognizer, PathBuf::from("/opt/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_load_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxAnalyzer::load(&ModelPaths::in_dir(dir.path())).err().unwrap();
        assert!(matches!(err, AnalyzerError::Detector(DetectorError::ModelNotFound(_))));
    }
}
