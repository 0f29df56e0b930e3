//! Still-image sources.

use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::frame::{self, Frame};

/// JPEG quality used for captured stills.
const CAPTURE_JPEG_QUALITY: u8 = 92;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode capture: {0}")]
    Encode(String),
}

/// Yields one still frame per capture request.
pub trait ImageSource {
    fn capture(&mut self) -> Result<Frame, CameraError>;
}

/// Treats an image file as the camera: every capture re-reads and re-encodes
/// it as JPEG.
pub struct FileImageSource {
    path: PathBuf,
    sequence: u32,
}

impl FileImageSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CameraError::NotFound(path.display().to_string()));
        }
        tracing::info!(path = %path.display(), "using image file as camera");
        Ok(Self {
            path: path.to_path_buf(),
            sequence: 0,
        })
    }
}

impl ImageSource for FileImageSource {
    fn capture(&mut self) -> Result<Frame, CameraError> {
        let img = image::open(&self.path)
            .map_err(|e| CameraError::Decode(format!("{}: {e}", self.path.display())))?;

        let gray = img.to_luma8();
        let is_dark = frame::is_dark_frame(gray.as_raw(), frame::DARK_THRESHOLD_PCT);
        if is_dark {
            tracing::warn!(
                brightness = frame::avg_brightness(gray.as_raw()),
                "captured frame is very dark"
            );
        }

        let rgb = img.to_rgb8();
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, CAPTURE_JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| CameraError::Encode(e.to_string()))?;

        self.sequence = self.sequence.wrapping_add(1);
        tracing::debug!(
            width = rgb.width(),
            height = rgb.height(),
            bytes = data.len(),
            seq = self.sequence,
            "captured still"
        );

        Ok(Frame {
            data,
            width: rgb.width(),
            height: rgb.height(),
            sequence: self.sequence,
            is_dark,
        })
    }
}

/// Stand-in when no camera is configured or access was denied.
pub struct UnavailableCamera {
    reason: String,
}

impl UnavailableCamera {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ImageSource for UnavailableCamera {
    fn capture(&mut self) -> Result<Frame, CameraError> {
        Err(CameraError::Unavailable(self.reason.clone()))
    }
}
