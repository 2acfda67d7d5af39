//! Drawing recognition results onto the uploaded photo.

use crate::types::BoundingBox;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

/// Label given to a face that matched nothing in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const LABEL_BAR_HEIGHT: u32 = 35;
const LABEL_MARGIN: u32 = 6;
const LABEL_SCALE: f32 = 24.0;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("not a usable TrueType/OpenType font: {0}")]
    Invalid(String),
}

/// A face box with the label it will be drawn with.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFace {
    pub bbox: BoundingBox,
    pub label: String,
    /// Similarity to the matched gallery entry; `None` for unknown faces.
    pub similarity: Option<f32>,
}

impl LabeledFace {
    pub fn is_known(&self) -> bool {
        self.similarity.is_some()
    }
}

/// DejaVu Sans Mono Bold, shipped with the crate so labels always render.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono-Bold.ttf");

/// Font used to render labels.
#[derive(Clone)]
pub struct LabelFont(FontArc);

impl LabelFont {
    pub fn bundled() -> Result<Self, FontError> {
        FontArc::try_from_slice(BUNDLED_FONT)
            .map(Self)
            .map_err(|e| FontError::Invalid(e.to_string()))
    }


    pub fn load(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FontError> {
        FontArc::try_from_vec(bytes)
            .map(Self)
            .map_err(|e| FontError::Invalid(e.to_string()))
    }
}

/// Outline every face, fill a label bar along the bottom of its box and write the label.
pub fn draw_faces(image: &mut RgbImage, faces: &[LabeledFace], font: &LabelFont) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    for face in faces {
        let edges = face.bbox.edges_within(width, height);
        let box_w = edges.right - edges.left + 1;
        let box_h = edges.bottom - edges.top + 1;

        for inset in 0..BOX_THICKNESS {
            if box_w <= inset * 2 || box_h <= inset * 2 {
                break;
            }
            let rect = Rect::at((edges.left + inset) as i32, (edges.top + inset) as i32)
                .of_size(box_w - inset * 2, box_h - inset * 2);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }

        let bar_top = edges.bottom.saturating_sub(LABEL_BAR_HEIGHT);
        let bar = Rect::at(edges.left as i32, bar_top as i32).of_size(box_w, edges.bottom - bar_top + 1);
        draw_filled_rect_mut(image, bar, BOX_COLOR);

        let scale = PxScale::from(LABEL_SCALE);
        let (_, text_h) = text_size(scale, &font.0, &face.label);
        let x = (edges.left + LABEL_MARGIN) as i32;
        let y = edges.bottom as i32 - LABEL_MARGIN as i32 - text_h as i32;
        draw_text_mut(image, TEXT_COLOR, x, y, scale, &font.0, &face.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font() -> LabelFont {
        LabelFont::bundled().unwrap()
    }

    /// Pixels inside `rect` bright enough in every channel to be label text.
    fn text_pixels(image: &RgbImage, left: u32, top: u32, right: u32, bottom: u32) -> usize {
        (top..=bottom)
            .flat_map(|y| (left..=right).map(move |x| (x, y)))
            .filter(|&(x, y)| image.get_pixel(x, y).0.iter().all(|&c| c > 200))
            .count()
    }

    fn face(x: f32, y: f32, w: f32, h: f32) -> LabeledFace {
        LabeledFace {
            bbox: BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None },
            label: UNKNOWN_LABEL.to_string(),
            similarity: None,
        }
    }

    #[test]
    fn test_draws_box_and_label_bar() {
        let mut image = RgbImage::new(200, 200);
        draw_faces(&mut image, &[face(20.0, 20.0, 100.0, 120.0)], &font());

        // Outer and inner outline rows.
        assert_eq!(image.get_pixel(60, 20), &BOX_COLOR);
        assert_eq!(image.get_pixel(60, 21), &BOX_COLOR);
        // Interior above the bar stays untouched.
        assert_eq!(image.get_pixel(60, 60), &Rgb([0, 0, 0]));
        // Label bar fills the bottom 35 px of the box.
        assert_eq!(image.get_pixel(21, 130), &BOX_COLOR);
        assert_eq!(image.get_pixel(21, 140), &BOX_COLOR);
        // Nothing outside the box.
        assert_eq!(image.get_pixel(150, 150), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_text_is_written_in_the_bar() {
        let mut image = RgbImage::new(200, 200);
        draw_faces(&mut image, &[face(20.0, 20.0, 100.0, 120.0)], &font());

        assert!(text_pixels(&image, 20, 105, 120, 140) > 20);
        assert_eq!(text_pixels(&image, 0, 0, 199, 100), 0);
    }

    #[test]
    fn test_box_at_image_edge_is_clamped() {
        let mut image = RgbImage::new(50, 50);
        draw_faces(&mut image, &[face(-10.0, 30.0, 100.0, 100.0)], &font());
        assert_eq!(image.get_pixel(0, 49), &BOX_COLOR);
    }

    #[test]
    fn test_degenerate_box_does_not_panic() {
        let mut image = RgbImage::new(10, 10);
        draw_faces(&mut image, &[face(5.0, 5.0, 0.0, 0.0)], &font());
        assert_eq!(image.get_pixel(5, 5), &BOX_COLOR);
    }

    #[test]
    fn test_inverted_box_is_drawn_without_panicking() {
        let mut image = RgbImage::new(100, 100);
        draw_faces(&mut image, &[face(60.0, 80.0, -40.0, -50.0)], &font());
        assert_eq!(image.get_pixel(20, 30), &BOX_COLOR);
        assert_eq!(image.get_pixel(60, 30), &BOX_COLOR);
        assert_eq!(image.get_pixel(5, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_invalid_font_bytes() {
        assert!(matches!(
            LabelFont::from_bytes(b"not a font".to_vec()),
            Err(FontError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_font_file() {
        let err = LabelFont::load(Path::new("/nonexistent/font.ttf")).err().unwrap();
        assert!(matches!(err, FontError::Io { .. }));
    }
}
