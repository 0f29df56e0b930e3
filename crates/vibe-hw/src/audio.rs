//! Synthesized cue tones.
//!
//! Each cue is a single oscillator with a pitch contour and a gain envelope.
//! [`Tone`] renders a cue into mono f32 samples and is a rodio [`Source`].
//! [`RodioCuePlayer`] plays tones on a dedicated audio thread; when no output
//! device can be opened the caller falls back to [`SilentPlayer`].

use rodio::{OutputStream, Sink, Source};
use std::f32::consts::PI;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use vibe_core::Cue;

pub const SAMPLE_RATE: u32 = 44_100;

/// Exponential ramps cannot reach zero; targets are clamped to this.
const EXP_FLOOR: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
}

impl Waveform {
    /// Oscillator value for a phase in cycles ([0, 1)).
    fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ramp {
    Linear { from: f32, to: f32 },
    Exponential { from: f32, to: f32 },
    /// Hold each value from its start time (seconds) until the next step.
    Steps(&'static [(f32, f32)]),
}

impl Ramp {
    /// Value at `t` seconds into a ramp lasting `span` seconds.
    fn at(&self, t: f32, span: f32) -> f32 {
        let x = if span > 0.0 { (t / span).clamp(0.0, 1.0) } else { 1.0 };
        match *self {
            Ramp::Linear { from, to } => from + (to - from) * x,
            Ramp::Exponential { from, to } => {
                let from = from.max(EXP_FLOOR);
                let to = to.max(EXP_FLOOR);
                from * (to / from).powf(x)
            }
            Ramp::Steps(steps) => steps
                .iter()
                .take_while(|(start, _)| *start <= t)
                .last()
                .or(steps.first())
                .map(|(_, v)| *v)
                .unwrap_or(0.0),
        }
    }
}

/// Oscillator recipe for one cue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub waveform: Waveform,
    pub frequency: Ramp,
    /// How long the frequency ramp takes; it holds its end value afterwards.
    pub sweep: Duration,
    pub gain: Ramp,
    pub duration: Duration,
}

impl ToneSpec {
    pub fn for_cue(cue: Cue) -> Self {
        match cue {
            // Mechanical click.
            Cue::Shutter => Self {
                waveform: Waveform::Square,
                frequency: Ramp::Exponential { from: 800.0, to: 100.0 },
                sweep: Duration::from_millis(100),
                gain: Ramp::Exponential { from: 0.3, to: 0.01 },
                duration: Duration::from_millis(100),
            },
            // Rising tension.
            Cue::Reveal => Self {
                waveform: Waveform::Sine,
                frequency: Ramp::Linear { from: 200.0, to: 600.0 },
                sweep: Duration::from_secs(2),
                gain: Ramp::Linear { from: 0.1, to: 0.0 },
                duration: Duration::from_secs(2),
            },
            // Heavy thud.
            Cue::Stamp => Self {
                waveform: Waveform::Triangle,
                frequency: Ramp::Exponential { from: 100.0, to: 20.0 },
                sweep: Duration::from_millis(300),
                gain: Ramp::Exponential { from: 0.5, to: 0.01 },
                duration: Duration::from_millis(300),
            },
            Cue::Fanfare => Self {
                waveform: Waveform::Triangle,
                frequency: Ramp::Steps(&[(0.0, 400.0), (0.1, 600.0), (0.2, 1000.0)]),
                sweep: Duration::from_millis(500),
                gain: Ramp::Linear { from: 0.2, to: 0.0 },
                duration: Duration::from_millis(500),
            },
        }
    }

    pub fn frequency_at(&self, t: f32) -> f32 {
        match self.frequency {
            Ramp::Steps(_) => self.frequency.at(t, self.sweep.as_secs_f32()),
            _ => self.frequency.at(t.min(self.sweep.as_secs_f32()), self.sweep.as_secs_f32()),
        }
    }

    pub fn gain_at(&self, t: f32) -> f32 {
        self.gain.at(t, self.duration.as_secs_f32())
    }

    pub fn total_samples(&self, sample_rate: u32) -> usize {
        (self.duration.as_secs_f64() * sample_rate as f64).round() as usize
    }

    pub fn render(&self) -> Tone {
        Tone::new(*self, SAMPLE_RATE)
    }
}

/// Finite mono sample stream for one tone.
#[derive(Debug, Clone)]
pub struct Tone {
    spec: ToneSpec,
    sample_rate: u32,
    num_sample: usize,
    total: usize,
    phase: f32,
}

impl Tone {
    pub fn new(spec: ToneSpec, sample_rate: u32) -> Self {
        Self {
            spec,
            sample_rate,
            num_sample: 0,
            total: spec.total_samples(sample_rate),
            phase: 0.0,
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total {
            return None;
        }
        let t = self.num_sample as f32 / self.sample_rate as f32;
        let sample = self.spec.waveform.sample(self.phase) * self.spec.gain_at(t);

        // Integrate frequency so pitch sweeps stay continuous.
        self.phase = (self.phase + self.spec.frequency_at(t) / self.sample_rate as f32).fract();
        self.num_sample += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.num_sample;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Tone {}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.spec.duration)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output: {0}")]
    NoOutput(String),
    #[error("audio thread: {0}")]
    Thread(String),
}

/// Fire-and-forget cue playback.
pub trait CuePlayer {
    fn play(&self, cue: Cue);
}

/// Plays nothing. Used when audio output is unavailable or muted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl CuePlayer for SilentPlayer {
    fn play(&self, cue: Cue) {
        tracing::trace!(%cue, "cue dropped; audio unavailable");
    }
}

/// Plays cue tones on the default output device.
///
/// The rodio stream is not `Send`, so it lives on its own thread and cues are
/// delivered over a channel. Each cue gets a detached sink, so a stamp can
/// sound over the tail of the reveal sweep. Dropping the player closes the
/// channel and ends the thread.
pub struct RodioCuePlayer {
    tx: Sender<Cue>,
}

impl RodioCuePlayer {
    /// Opens the default output device. Fails when there is none.
    pub fn open() -> Result<Self, AudioError> {
        let (tx, rx) = mpsc::channel::<Cue>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("vibe-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(cue) = rx.recv() {
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            sink.append(ToneSpec::for_cue(cue).render());
                            sink.detach();
                        }
                        Err(e) => tracing::warn!(%cue, error = %e, "failed to open audio sink"),
                    }
                }
                tracing::debug!("audio thread exiting");
            })
            .map_err(|e| AudioError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("audio output opened");
                Ok(Self { tx })
            }
            Ok(Err(e)) => Err(AudioError::NoOutput(e)),
            Err(_) => Err(AudioError::Thread("audio thread exited during startup".into())),
        }
    }
}

impl CuePlayer for RodioCuePlayer {
    fn play(&self, cue: Cue) {
        tracing::debug!(%cue, "cue");
        if self.tx.send(cue).is_err() {
            tracing::warn!(%cue, "audio thread gone; cue dropped");
        }
    }
}

/// The device player when one can be opened, otherwise [`SilentPlayer`].
pub fn open_cue_player() -> Box<dyn CuePlayer> {
    match RodioCuePlayer::open() {
        Ok(player) => Box::new(player),
        Err(e) => {
            tracing::warn!(error = %e, "cue sounds disabled");
            Box::new(SilentPlayer)
        }
    }
}
