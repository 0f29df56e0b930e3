use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::rarity::RarityTier;

/// A facial keypoint in normalized frame coordinates ([0, 1] per axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered landmark points for one detected face.
pub type LandmarkSet = Vec<Landmark>;

/// Axis-aligned extent of one face's landmarks, recomputed every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBoundingBox {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl FaceBoundingBox {
    /// Bounding box of all points, or `None` for an empty set.
    pub fn from_landmarks(points: &[Landmark]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(points[1..].iter().fold(init, |b, p| Self {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }

    /// True when the box stays strictly inside a band of `margin` on every edge.
    pub fn within_margin(&self, margin: f32) -> bool {
        self.min_x > margin
            && self.max_x < 1.0 - margin
            && self.min_y > margin
            && self.max_y < 1.0 - margin
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Capture mode. Friends mode photographs a group and skips the
/// single-face framing requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    #[default]
    Solo,
    Friends,
}

impl CameraMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraMode::Solo => "solo",
            CameraMode::Friends => "friends",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown camera mode: {0} (expected solo or friends)")]
pub struct ParseModeError(String);

impl FromStr for CameraMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solo" => Ok(CameraMode::Solo),
            "friends" => Ok(CameraMode::Friends),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Short synthesized sound effects played at capture and reveal moments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Shutter,
    Reveal,
    Stamp,
    Fanfare,
}

impl Cue {
    pub const ALL: [Cue; 4] = [Cue::Shutter, Cue::Reveal, Cue::Stamp, Cue::Fanfare];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Shutter => "shutter",
            Cue::Reveal => "reveal",
            Cue::Stamp => "stamp",
            Cue::Fanfare => "fanfare",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque still image as handed to the description generator.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    /// MIME type of `data` (e.g., "image/jpeg").
    pub mime: String,
}

/// Everything one capture produced. Discarded on retake.
#[derive(Debug, Clone)]
pub struct CapturedResult {
    pub id: Uuid,
    pub image: CapturedImage,
    pub mode: CameraMode,
    pub description: String,
    pub rarity: RarityTier,
}

impl CapturedResult {
    pub fn new(
        image: CapturedImage,
        mode: CameraMode,
        description: String,
        rarity: RarityTier,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            mode,
            description,
            rarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_empty() {
        assert!(FaceBoundingBox::from_landmarks(&[]).is_none());
    }

    #[test]
    fn test_bounding_box_extent() {
        let points = vec![
            Landmark::new(0.3, 0.4),
            Landmark::new(0.7, 0.2),
            Landmark::new(0.5, 0.9),
        ];
        let b = FaceBoundingBox::from_landmarks(&points).unwrap();
        assert_eq!(b.min_x, 0.3);
        assert_eq!(b.max_x, 0.7);
        assert_eq!(b.min_y, 0.2);
        assert_eq!(b.max_y, 0.9);
        assert!((b.width() - 0.4).abs() < 1e-6);
        assert!((b.height() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_within_margin_is_strict() {
        let b = FaceBoundingBox { min_x: 0.1, max_x: 0.5, min_y: 0.3, max_y: 0.5 };
        assert!(!b.within_margin(0.1));
        let b = FaceBoundingBox { min_x: 0.11, max_x: 0.89, min_y: 0.11, max_y: 0.89 };
        assert!(b.within_margin(0.1));
    }

    #[test]
    fn test_camera_mode_parse() {
        assert_eq!("solo".parse::<CameraMode>().unwrap(), CameraMode::Solo);
        assert_eq!(" Friends ".parse::<CameraMode>().unwrap(), CameraMode::Friends);
        assert!("party".parse::<CameraMode>().is_err());
        assert_eq!(CameraMode::Friends.to_string(), "friends");
    }

    #[test]
    fn test_camera_mode_serde() {
        let json = serde_json::to_string(&CameraMode::Friends).unwrap();
        assert_eq!(json, "\"friends\"");
        let mode: CameraMode = serde_json::from_str("\"solo\"").unwrap();
        assert_eq!(mode, CameraMode::Solo);
    }
}
