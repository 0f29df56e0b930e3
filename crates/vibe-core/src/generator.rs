//! Verdict generation.
//!
//! The actual generator is an external black box. Whatever it is, callers go
//! through [`ResilientGenerator`], which never fails: errors and blank output
//! are replaced by a canned compliment chosen uniformly at random.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::types::{CameraMode, CapturedImage};

pub const FALLBACK_COMPLIMENTS: [&str; 15] = [
    "Analysis complete. Your facial symmetry indicates a rare and captivating harmony.",
    "Biometric scan positive. Your eyes reflect a depth of kindness that is statistically rare.",
    "Subject possesses a radiant energy field. A truly timeless beauty.",
    "Structure analysis: 99.9% match with classical aesthetic perfection.",
    "Detected: A smile that could light up the darkest room. Absolutely stunning.",
    "Features indicate a strong, resilient character mixed with gentle grace.",
    "Aesthetic score: Off the charts. You are glowing with inner potential.",
    "Visual cortex overload. Your beauty is simply undeniable.",
    "Scan results: 100% Authentic Beauty. No filters needed.",
    "The camera loves you, but the world loves you more. You look incredible.",
    "Data indicates a heart of gold matching a face of pure elegance.",
    "You have a magnetic presence that the sensors are picking up immediately.",
    "There is a unique sparkle in your eyes that suggests great creativity.",
    "Your features tell a story of strength, beauty, and resilience.",
    "Warning: High levels of charm detected. Proceed with confidence.",
];

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("generator returned no text")]
    Empty,
}

/// Produces a display string for a captured image.
#[allow(async_fn_in_trait)]
pub trait DescriptionGenerator {
    async fn generate(&self, image: &CapturedImage, mode: CameraMode) -> Result<String, GenerateError>;
}

pub fn random_compliment<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    FALLBACK_COMPLIMENTS
        .choose(rng)
        .copied()
        .unwrap_or(FALLBACK_COMPLIMENTS[0])
}

/// Always answers with a canned compliment. Used when no backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackGenerator;

impl DescriptionGenerator for FallbackGenerator {
    async fn generate(&self, _image: &CapturedImage, _mode: CameraMode) -> Result<String, GenerateError> {
        Ok(random_compliment(&mut rand::thread_rng()).to_string())
    }
}

/// Wraps an optional backend so that generation always resolves to text.
pub struct ResilientGenerator<G> {
    backend: Option<G>,
}

impl<G: DescriptionGenerator> ResilientGenerator<G> {
    pub fn new(backend: G) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// No backend: every call yields a canned compliment.
    pub fn fallback_only() -> Self {
        Self { backend: None }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn describe(&self, image: &CapturedImage, mode: CameraMode) -> String {
        let Some(backend) = &self.backend else {
            tracing::debug!("no generator backend; using fallback compliment");
            return random_compliment(&mut rand::thread_rng()).to_string();
        };

        let result = backend
            .generate(image, mode)
            .await
            .and_then(|text| {
                let text = text.trim();
                if text.is_empty() {
                    Err(GenerateError::Empty)
                } else {
                    Ok(text.to_string())
                }
            });

        match result {
            Ok(text) => {
                tracing::info!(%mode, chars = text.chars().count(), "description generated");
                text
            }
            Err(e) => {
                tracing::warn!(error = %e, %mode, "generation failed; falling back to preset compliment");
                random_compliment(&mut rand::thread_rng()).to_string()
            }
        }
    }
}
