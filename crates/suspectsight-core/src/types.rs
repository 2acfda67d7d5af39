use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Default cosine-similarity threshold for two ArcFace encodings to match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.40;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer pixel edges of a face box, clamped to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelEdges {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Round the box to pixel edges inside a `width` x `height` image.
    ///
    /// A negative width or height is read as a box extending left or up from
    /// `(x, y)`, so `left <= right` and `top <= bottom` always hold.
    pub fn edges_within(&self, width: u32, height: u32) -> PixelEdges {
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        let clamp = |v: f32, max: f32| if v.is_nan() { 0 } else { v.round().clamp(0.0, max) as u32 };

        let (x1, x2) = (self.x, self.x + self.width);
        let (y1, y2) = (self.y, self.y + self.height);

        PixelEdges {
            left: clamp(x1.min(x2), max_x),
            top: clamp(y1.min(y2), max_y),
            right: clamp(x1.max(x2), max_x),
            bottom: clamp(y1.max(y2), max_y),
        }
    }
}

/// Face encoding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
    /// Model version that produced this encoding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Encodings of different length never compare as similar.
    pub fn similarity(&self, other: &Encoding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// How a probe encoding picks a winner among several matching candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// The first candidate in gallery order that passes the threshold wins.
    #[default]
    FirstMatch,
    /// The candidate with the highest similarity that passes the threshold wins.
    Closest,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown match policy {0:?} (expected \"first-match\" or \"closest\")")]
pub struct ParsePolicyError(String);

impl FromStr for MatchPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-match" | "first" => Ok(Self::FirstMatch),
            "closest" => Ok(Self::Closest),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// A winning candidate: its position in the candidate list and its similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub similarity: f32,
}

impl MatchPolicy {
    /// Select a winning candidate for `probe`, or `None` when nothing passes `threshold`.
    pub fn select<'a, I>(self, probe: &Encoding, candidates: I, threshold: f32) -> Option<Selection>
    where
        I: IntoIterator<Item = &'a Encoding>,
    {
        let mut passing = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| Selection {
                index,
                similarity: probe.similarity(candidate),
            })
            .filter(|s| s.similarity >= threshold);

        match self {
            Self::FirstMatch => passing.next(),
            Self::Closest => passing.fold(None, |best: Option<Selection>, s| match best {
                Some(b) if b.similarity >= s.similarity => Some(b),
                _ => Some(s),
            }),
        }
    }
}

/// Threshold and policy used when matching probes against known encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    pub threshold: f32,
    pub policy: MatchPolicy,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            policy: MatchPolicy::FirstMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(values: &[f32]) -> Encoding {
        Encoding::new(values.to_vec())
    }

    #[test]
    fn test_similarity_identical() {
        let a = enc(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal_and_opposite() {
        let a = enc(&[1.0, 0.0]);
        assert!(a.similarity(&enc(&[0.0, 1.0])).abs() < 1e-6);
        assert!((a.similarity(&enc(&[-1.0, 0.0])) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        assert_eq!(enc(&[0.0, 0.0]).similarity(&enc(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_similarity_length_mismatch() {
        assert_eq!(enc(&[1.0, 0.0]).similarity(&enc(&[1.0, 0.0, 0.0])), 0.0);
    }

    #[test]
    fn test_first_match_takes_gallery_order() {
        let probe = enc(&[1.0, 0.0]);
        let candidates = [enc(&[0.0, 1.0]), enc(&[0.8, 0.6]), enc(&[1.0, 0.0])];

        let first = MatchPolicy::FirstMatch.select(&probe, &candidates, 0.5).unwrap();
        assert_eq!(first.index, 1);

        let closest = MatchPolicy::Closest.select(&probe, &candidates, 0.5).unwrap();
        assert_eq!(closest.index, 2);
        assert!((closest.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_select_nothing_passes() {
        let probe = enc(&[1.0, 0.0]);
        let candidates = [enc(&[0.0, 1.0])];
        assert!(MatchPolicy::FirstMatch.select(&probe, &candidates, 0.5).is_none());
        assert!(MatchPolicy::Closest.select(&probe, &candidates, 0.5).is_none());
        assert!(MatchPolicy::Closest.select(&probe, &[], 0.5).is_none());
    }

    #[test]
    fn test_closest_tie_keeps_earliest() {
        let probe = enc(&[1.0, 0.0]);
        let candidates = [enc(&[2.0, 0.0]), enc(&[1.0, 0.0])];
        let pick = MatchPolicy::Closest.select(&probe, &candidates, 0.5).unwrap();
        assert_eq!(pick.index, 0);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("first-match".parse::<MatchPolicy>(), Ok(MatchPolicy::FirstMatch));
        assert_eq!(" Closest ".parse::<MatchPolicy>(), Ok(MatchPolicy::Closest));
        assert!("nearest".parse::<MatchPolicy>().is_err());
    }

    #[test]
    fn test_edges_clamped_to_image() {
        let face = BoundingBox {
            x: -4.6,
            y: 10.2,
            width: 200.0,
            height: 20.0,
            confidence: 0.9,
            landmarks: None,
        };
        let edges = face.edges_within(100, 50);
        assert_eq!(
            edges,
            PixelEdges { left: 0, top: 10, right: 99, bottom: 30 }
        );
    }

    #[test]
    fn test_edges_of_inverted_box_are_ordered() {
        let face = BoundingBox {
            x: 40.0,
            y: 30.0,
            width: -10.0,
            height: -20.0,
            confidence: 0.9,
            landmarks: None,
        };
        let edges = face.edges_within(100, 50);
        assert_eq!(
            edges,
            PixelEdges { left: 30, top: 10, right: 40, bottom: 30 }
        );

        let offscreen = BoundingBox { x: -5.0, width: -10.0, ..face };
        let edges = offscreen.edges_within(100, 50);
        assert_eq!((edges.left, edges.right), (0, 0));
    }

    #[test]
    fn test_encoding_json_omits_missing_version() {
        let json = serde_json::to_string(&enc(&[0.5])).unwrap();
        assert_eq!(json, r#"{"values":[0.5]}"#);
        let back: Encoding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, enc(&[0.5]));
    }
}
