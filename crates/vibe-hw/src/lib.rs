//! vibe-hw — Device seams for the photobooth.
//!
//! Still capture from image files, landmark feeds for the framing gate,
//! synthesized cue tones, process-backed speech output and saved result
//! cards.

pub mod audio;
pub mod camera;
pub mod export;
pub mod frame;
pub mod landmarks;
pub mod speech;

pub use audio::{open_cue_player, AudioError, CuePlayer, RodioCuePlayer, SilentPlayer, Tone, ToneSpec};
pub use camera::{CameraError, FileImageSource, ImageSource, UnavailableCamera};
pub use export::{save_card, ExportError};
pub use frame::Frame;
pub use landmarks::{DetectorError, LandmarkDetector, ScriptedDetector, SyntheticFace};
pub use speech::{CommandSpeech, SpeechError, SpeechOutput, SpeechSlot};
