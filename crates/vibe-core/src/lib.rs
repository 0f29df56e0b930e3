//! vibe-core — Photobooth reveal logic.
//!
//! Weighted rarity draws, day-over-day visit streaks, per-frame face
//! framing checks and the timed reveal state machine. No clocks, devices
//! or global state live here: time is passed in and storage is injected.

pub mod credential;
pub mod gate;
pub mod generator;
pub mod highlight;
pub mod rarity;
pub mod reveal;
pub mod store;
pub mod streak;
pub mod types;

pub use gate::{capture_allowed, is_face_framed, FacePresenceGate};
pub use generator::{DescriptionGenerator, FallbackGenerator, GenerateError, ResilientGenerator};
pub use rarity::{RarityId, RarityTable, RarityTier};
pub use reveal::{RevealEvent, RevealOrchestrator, RevealPhase, RevealTiming};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use streak::{update_streak, StreakState, StreakTracker, StreakUpdate};
pub use types::{CameraMode, CapturedImage, CapturedResult, Cue, FaceBoundingBox, Landmark, LandmarkSet};
