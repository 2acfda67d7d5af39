//! suspectsight-core: face analysis shared by the recognition service and the dashboard.
//!
//! SCRFD finds faces and ArcFace encodes them, both via ONNX Runtime. On top
//! of that sit encoding comparison, the known-face gallery, box-and-label
//! annotation and a worker pool that keeps blocking inference off async tasks.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod detector;
pub mod gallery;
pub mod pool;
pub mod recognize;
pub mod recognizer;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use analyzer::{data_dir, default_model_dir, AnalyzerError, DetectedFace, FaceAnalyzer, ModelPaths, OnnxAnalyzer};
pub use annotate::{FontError, LabelFont, LabeledFace, UNKNOWN_LABEL};
pub use detector::FaceDetector;
pub use gallery::{Gallery, GalleryError, KnownFace};
pub use pool::{AnalyzerPool, PoolError};
pub use recognize::{Recognition, RecognizeError};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Encoding, MatchPolicy, MatchSettings, DEFAULT_MATCH_THRESHOLD};
