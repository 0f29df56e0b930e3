//! Spoken verdicts.
//!
//! [`SpeechSlot`] keeps at most one utterance in flight: a new utterance
//! cancels the previous one, and dropping the slot cancels whatever is still
//! speaking. A missing speech engine degrades to silence.

use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// Relative speaking rate and pitch applied to every utterance.
pub const SPEECH_RATE: f32 = 0.9;
pub const SPEECH_PITCH: f32 = 1.1;

/// espeak defaults that the relative rate/pitch scale.
const ESPEAK_BASE_WPM: f32 = 175.0;
const ESPEAK_BASE_PITCH: f32 = 50.0;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("failed to start speech: {0}")]
    Spawn(std::io::Error),
    #[error("failed to stop speech: {0}")]
    Cancel(std::io::Error),
}

pub trait SpeechOutput {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
    fn cancel(&mut self) -> Result<(), SpeechError>;
    fn is_speaking(&mut self) -> bool;
}

/// Speaks by running an external text-to-speech program with the text as
/// its last argument; cancelling kills the process.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// Build from a command line such as `"espeak-ng -v en-us"`. espeak
    /// variants get rate and pitch flags derived from the relative values.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        let mut args: Vec<String> = parts.collect();

        let name = std::path::Path::new(&program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.starts_with("espeak") {
            args.push("-s".into());
            args.push(format!("{}", (ESPEAK_BASE_WPM * SPEECH_RATE).round() as u32));
            args.push("-p".into());
            args.push(format!("{}", (ESPEAK_BASE_PITCH * SPEECH_PITCH).round() as u32));
        }
        Some(Self::new(program, args))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl SpeechOutput for CommandSpeech {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.cancel()?;
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    SpeechError::Unavailable(format!("{}: {e}", self.program))
                }
                _ => SpeechError::Spawn(e),
            })?;
        tracing::debug!(program = %self.program, pid = child.id(), "speech started");
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), SpeechError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        child.kill().map_err(SpeechError::Cancel)?;
        child.wait().map_err(SpeechError::Cancel)?;
        tracing::debug!(program = %self.program, "speech cancelled");
        Ok(())
    }

    fn is_speaking(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}

/// Single-utterance owner around an optional speech engine.
pub struct SpeechSlot<S: SpeechOutput> {
    output: Option<S>,
    utterances: u64,
}

impl<S: SpeechOutput> SpeechSlot<S> {
    pub fn new(output: S) -> Self {
        Self {
            output: Some(output),
            utterances: 0,
        }
    }

    /// A slot with no engine: every call is a no-op.
    pub fn disabled() -> Self {
        Self {
            output: None,
            utterances: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.output.is_some()
    }

    /// Number of utterances started through this slot.
    pub fn utterances(&self) -> u64 {
        self.utterances
    }

    pub fn speak(&mut self, text: &str) {
        let Some(output) = self.output.as_mut() else {
            return;
        };
        if output.is_speaking() {
            if let Err(e) = output.cancel() {
                tracing::warn!(error = %e, "could not cancel previous utterance");
            }
        }
        match output.speak(text) {
            Ok(()) => self.utterances += 1,
            Err(SpeechError::Unavailable(reason)) => {
                tracing::warn!(%reason, "speech unavailable; continuing silently");
                self.output = None;
            }
            Err(e) => tracing::warn!(error = %e, "speech failed"),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.cancel() {
                tracing::warn!(error = %e, "speech cancel failed");
            }
        }
    }

    pub fn is_speaking(&mut self) -> bool {
        self.output.as_mut().is_some_and(|o| o.is_speaking())
    }
}

impl<S: SpeechOutput> Drop for SpeechSlot<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}
