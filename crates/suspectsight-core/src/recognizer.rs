//! ArcFace face encoder via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalised face encodings from aligned RGB
//! crops, using the w600k_r50 ArcFace model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{BoundingBox, Encoding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // ArcFace uses symmetric normalization, unlike SCRFD
pub const ARCFACE_ENCODING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks — detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded ArcFace model");

        Ok(Self { session })
    }

    /// Encode one detected face of an RGB photo.
    ///
    /// The face must carry SCRFD landmarks; it is aligned to the canonical
    /// 112x112 crop before inference.
    pub fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Encoding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        let input = to_input_tensor(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("encoding extraction: {e}")))?;

        normalize(raw).map(|values| Encoding {
            values,
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Check the raw model output length and L2-normalise it.
fn normalize(raw: &[f32]) -> Result<Vec<f32>, RecognizerError> {
    if raw.len() != ARCFACE_ENCODING_DIM {
        return Err(RecognizerError::InferenceFailed(format!(
            "expected {ARCFACE_ENCODING_DIM}-dim encoding, got {}",
            raw.len()
        )));
    }

    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        Ok(raw.iter().map(|x| x / norm).collect())
    } else {
        Ok(raw.to_vec())
    }
}

/// Convert a 112x112 aligned RGB crop into a normalised NCHW tensor.
fn to_input_tensor(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in aligned.enumerate_pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            tensor[[0, channel, y as usize, x as usize]] = (value as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_input_tensor_shape_and_channels() {
        let aligned = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([255, 128, 0]));
        let tensor = to_input_tensor(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 5, 5]] - (128.0 - ARCFACE_MEAN) / ARCFACE_STD).abs() < 1e-6);
        assert!((tensor[[0, 2, 5, 5]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut raw = vec![0.0f32; ARCFACE_ENCODING_DIM];
        raw[0] = 3.0;
        raw[1] = 4.0;
        let values = normalize(&raw).unwrap();
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_wrong_dimension() {
        let err = normalize(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, RecognizerError::InferenceFailed(_)));
    }

    #[test]
    fn test_normalize_keeps_zero_vector() {
        let raw = vec![0.0f32; ARCFACE_ENCODING_DIM];
        assert_eq!(normalize(&raw).unwrap(), raw);
    }
}
