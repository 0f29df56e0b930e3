//! Landmark feeds for the face-presence gate.
//!
//! The vision model itself is external. A feed only has to hand back zero
//! or more landmark sets each time it is polled (once per frame).

use std::f32::consts::PI;
use std::path::Path;
use thiserror::Error;
use vibe_core::{Landmark, LandmarkSet};

/// Points on the synthetic face oval.
const SYNTHETIC_POINTS: usize = 36;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to read landmark script {0}: {1}")]
    Io(String, std::io::Error),
    #[error("invalid landmark script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("landmark script has no frames")]
    Empty,
}

pub trait LandmarkDetector {
    /// Landmark sets for the current frame, first detected face first.
    fn detect(&mut self) -> Vec<LandmarkSet>;
}

/// Replays a recorded sequence of frames, holding the last one once the
/// script runs out.
///
/// Script format (JSON): `[[[{"x":0.4,"y":0.3}, ...], ...], ...]`, i.e.
/// frames → faces → points.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    frames: Vec<Vec<LandmarkSet>>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<LandmarkSet>>) -> Result<Self, DetectorError> {
        if frames.is_empty() {
            return Err(DetectorError::Empty);
        }
        Ok(Self { frames, cursor: 0 })
    }

    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::Io(path.display().to_string(), e))?;
        let detector = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), frames = detector.frames.len(), "landmark script loaded");
        Ok(detector)
    }
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&mut self) -> Vec<LandmarkSet> {
        let idx = self.cursor.min(self.frames.len() - 1);
        self.cursor = self.cursor.saturating_add(1);
        self.frames[idx].clone()
    }
}

/// A single motionless face: an oval of landmarks around a fixed centre.
#[derive(Debug, Clone)]
pub struct SyntheticFace {
    face: LandmarkSet,
}

impl SyntheticFace {
    pub fn new(cx: f32, cy: f32, rx: f32, ry: f32) -> Self {
        let face = (0..SYNTHETIC_POINTS)
            .map(|i| {
                let a = 2.0 * PI * i as f32 / SYNTHETIC_POINTS as f32;
                Landmark::new(cx + rx * a.cos(), cy + ry * a.sin())
            })
            .collect();
        Self { face }
    }

    /// A face sitting comfortably inside the frame.
    pub fn centered() -> Self {
        Self::new(0.5, 0.5, 0.2, 0.28)
    }
}

impl LandmarkDetector for SyntheticFace {
    fn detect(&mut self) -> Vec<LandmarkSet> {
        vec![self.face.clone()]
    }
}
