//! The recognition pipeline: decode, analyze, label against a gallery, draw, re-encode.

use crate::analyzer::{AnalyzerError, DetectedFace, FaceAnalyzer};
use crate::annotate::{draw_faces, LabelFont, LabeledFace, UNKNOWN_LABEL};
use crate::gallery::Gallery;
use crate::types::{Encoding, MatchSettings};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode annotated image: {0}")]
    Encode(#[source] image::ImageError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// An annotated JPEG and the faces drawn on it.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub jpeg: Vec<u8>,
    pub faces: Vec<LabeledFace>,
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, RecognizeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(RecognizeError::Decode)
}

/// Give each detected face the label of its gallery match, or "Unknown".
pub fn label_faces(faces: Vec<DetectedFace>, gallery: &Gallery, settings: MatchSettings) -> Vec<LabeledFace> {
    faces
        .into_iter()
        .map(|face| match gallery.identify(&face.encoding, settings) {
            Some((known, similarity)) => LabeledFace {
                bbox: face.bbox,
                label: known.label.clone(),
                similarity: Some(similarity),
            },
            None => LabeledFace {
                bbox: face.bbox,
                label: UNKNOWN_LABEL.to_string(),
                similarity: None,
            },
        })
        .collect()
}

/// Find, label and outline every face in an uploaded photo.
pub fn recognize<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    bytes: &[u8],
    gallery: &Gallery,
    settings: MatchSettings,
    font: &LabelFont,
) -> Result<Recognition, RecognizeError> {
    let mut image = decode_image(bytes)?;
    let detected = analyzer.analyze(&image)?;
    let faces = label_faces(detected, gallery, settings);

    tracing::debug!(
        faces = faces.len(),
        known = faces.iter().filter(|f| f.is_known()).count(),
        "recognized photo"
    );

    draw_faces(&mut image, &faces, font);
    let jpeg = to_jpeg(image)?;
    Ok(Recognition { jpeg, faces })
}

/// Encoding of the first (most confident) face in a photo, if any.
pub fn encode_first<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    bytes: &[u8],
) -> Result<Option<Encoding>, RecognizeError> {
    let image = decode_image(bytes)?;
    Ok(analyzer.analyze(&image)?.into_iter().next().map(|face| face.encoding))
}

fn to_jpeg(image: RgbImage) -> Result<Vec<u8>, RecognizeError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(RecognizeError::Encode)?;
    Ok(buf)
}
