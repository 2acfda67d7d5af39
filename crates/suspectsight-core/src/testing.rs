//! Deterministic stand-ins for the face model, for tests in this and dependent crates.

use crate::analyzer::{AnalyzerError, DetectedFace, FaceAnalyzer};
use crate::types::{BoundingBox, Encoding};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sees exactly one face per photo, encoded as the colour of the top-left pixel.
///
/// A black top-left pixel means "no face". Photos of the same colour therefore
/// match each other and photos of unrelated colours do not.
#[derive(Debug, Clone, Default)]
pub struct PixelAnalyzer {
    calls: Arc<AtomicUsize>,
}

impl PixelAnalyzer {
    /// Number of `analyze` calls made through this analyzer or any clone of it.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceAnalyzer for PixelAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let Some(&Rgb([r, g, b])) = image.get_pixel_checked(0, 0) else {
            return Ok(Vec::new());
        };
        if [r, g, b] == [0, 0, 0] {
            return Ok(Vec::new());
        }

        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![DetectedFace {
            bbox: BoundingBox {
                x: w / 4.0,
                y: h / 4.0,
                width: w / 2.0,
                height: h / 2.0,
                confidence: 0.99,
                landmarks: None,
            },
            encoding: Encoding::new(vec![r as f32, g as f32, b as f32]),
        }])
    }
}

/// A solid-colour PNG.
pub fn png_bytes(color: [u8; 3], width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap_or_default();
    buf
}

/// Boundary used by [`multipart_body`].
pub const MULTIPART_BOUNDARY: &str = "suspectsight-test-boundary";

/// One part of a `multipart/form-data` test request.
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// `Content-Type` header value matching [`multipart_body`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}")
}

/// Encode `parts` as a `multipart/form-data` body.
pub fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
