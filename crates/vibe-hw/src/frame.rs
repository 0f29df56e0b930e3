//! Captured still frame and luma checks.

use vibe_core::CapturedImage;

pub const JPEG_MIME: &str = "image/jpeg";

/// Share of near-black pixels above which a capture counts as dark.
pub const DARK_THRESHOLD_PCT: f32 = 0.95;

/// A single encoded still, as taken at the shutter.
#[derive(Clone)]
pub struct Frame {
    /// Encoded image bytes (JPEG).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture count for the source, starting at 1.
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Something the person in front of the booth should hear about before
    /// the reveal starts.
    pub fn notice(&self) -> Option<&'static str> {
        self.is_dark
            .then_some("The photo came out very dark. More light helps next time.")
    }

    /// Hand the encoded bytes over as an opaque generator payload.
    pub fn into_captured(self) -> CapturedImage {
        CapturedImage {
            data: self.data,
            mime: JPEG_MIME.to_string(),
        }
    }
}

/// Average luma (0.0–255.0).
pub fn avg_brightness(gray: &[u8]) -> f32 {
    if gray.is_empty() {
        return 0.0;
    }
    gray.iter().map(|&b| b as f32).sum::<f32>() / gray.len() as f32
}

/// True if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}
