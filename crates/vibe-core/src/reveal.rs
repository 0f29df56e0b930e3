//! Staged reveal of a capture result.
//!
//! Phases run strictly forward: analyzing → tension → revealed. The
//! orchestrator never owns a clock; drivers call [`RevealOrchestrator::tick`]
//! with the current instant and carry out the returned [`RevealEvent`]s.
//!
//! State transitions:
//! - ANALYZING → TENSION: description available AND dwell elapsed since creation
//! - TENSION → REVEALED: progress (sampled every 50 ms) reaches 100%
//! - REVEALED: typewriter, one character per 50 ms, then speech unless muted
//!
//! Exactly one phase timer is armed at a time; entering a phase replaces it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use crate::rarity::{RarityTable, RarityTier};
use crate::types::Cue;

/// Minimum time spent analyzing, even when the description is ready at once.
pub const ANALYZING_DWELL: Duration = Duration::from_millis(1500);
/// Tension length is drawn uniformly from `[TENSION_MIN, TENSION_MAX)`.
pub const TENSION_MIN: Duration = Duration::from_millis(3000);
pub const TENSION_MAX: Duration = Duration::from_millis(5000);
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);
pub const TYPEWRITER_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTiming {
    pub dwell: Duration,
    pub tension_min: Duration,
    pub tension_max: Duration,
    pub progress_interval: Duration,
    pub typewriter_interval: Duration,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            dwell: ANALYZING_DWELL,
            tension_min: TENSION_MIN,
            tension_max: TENSION_MAX,
            progress_interval: PROGRESS_INTERVAL,
            typewriter_interval: TYPEWRITER_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    Analyzing,
    Tension,
    Revealed,
}

/// Side effects requested by the orchestrator, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RevealEvent {
    PhaseChanged(RevealPhase),
    Cue(Cue),
    /// Tension progress in percent, never above 100.
    Progress(f32),
    /// Number of description characters now visible.
    TextAdvanced { shown: usize, total: usize },
    /// Speak this text, replacing anything currently being spoken.
    Speak(String),
    CancelSpeech,
}

/// The single timer driving the current phase.
#[derive(Debug, Clone, Copy)]
enum PhaseTimer {
    Dwell { deadline: Instant },
    Progress {
        started: Instant,
        duration: Duration,
        next_fire: Instant,
    },
    Typewriter { next_fire: Instant },
}

pub struct RevealOrchestrator<R = StdRng> {
    phase: RevealPhase,
    timer: Option<PhaseTimer>,
    timing: RevealTiming,
    rarity: RarityTier,
    description: Option<String>,
    total_chars: usize,
    shown_chars: usize,
    progress: f32,
    muted: bool,
    rng: R,
}

impl RevealOrchestrator<StdRng> {
    /// Start a reveal at `now` with default timing, rolling rarity from `table`.
    pub fn new(table: &RarityTable, now: Instant) -> Self {
        Self::with_rng(table, RevealTiming::default(), now, StdRng::from_entropy())
    }
}

impl<R: Rng> RevealOrchestrator<R> {
    /// Rarity is rolled here, once, before any phase has run.
    pub fn with_rng(table: &RarityTable, timing: RevealTiming, now: Instant, mut rng: R) -> Self {
        let rarity = table.roll(&mut rng).clone();
        Self::with_rarity(rarity, timing, now, rng)
    }

    pub fn with_rarity(rarity: RarityTier, timing: RevealTiming, now: Instant, rng: R) -> Self {
        tracing::info!(rarity = %rarity.id, "reveal started");
        Self {
            phase: RevealPhase::Analyzing,
            timer: Some(PhaseTimer::Dwell {
                deadline: now + timing.dwell,
            }),
            timing,
            rarity,
            description: None,
            total_chars: 0,
            shown_chars: 0,
            progress: 0.0,
            muted: false,
            rng,
        }
    }

    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    pub fn rarity(&self) -> &RarityTier {
        &self.rarity
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// The typewriter-visible prefix of the description.
    pub fn displayed_text(&self) -> &str {
        let Some(text) = self.description.as_deref() else {
            return "";
        };
        match text.char_indices().nth(self.shown_chars) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }

    /// Revealed and fully typed out; nothing left to drive.
    pub fn is_complete(&self) -> bool {
        self.phase == RevealPhase::Revealed && self.timer.is_none()
    }

    /// When the armed timer next wants a tick. `None` while waiting on the
    /// description (or when done).
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.timer? {
            PhaseTimer::Dwell { deadline } => self.description.as_ref().map(|_| deadline),
            PhaseTimer::Progress { next_fire, .. } => Some(next_fire),
            PhaseTimer::Typewriter { next_fire } => Some(next_fire),
        }
    }

    /// Deliver the generated description. Blank text and repeats are ignored.
    pub fn on_description(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.description.is_some() {
            tracing::warn!("description already delivered; ignoring");
            return;
        }
        if text.trim().is_empty() {
            tracing::warn!("blank description ignored");
            return;
        }
        self.total_chars = text.chars().count();
        tracing::debug!(chars = self.total_chars, "description received");
        self.description = Some(text);
    }

    pub fn set_muted(&mut self, muted: bool) -> Vec<RevealEvent> {
        if muted == self.muted {
            return Vec::new();
        }
        self.muted = muted;
        if muted {
            vec![RevealEvent::CancelSpeech]
        } else if self.is_complete() {
            self.description
                .iter()
                .map(|text| RevealEvent::Speak(text.clone()))
                .collect()
        } else {
            // The typewriter speaks on completion.
            Vec::new()
        }
    }

    /// Discard the reveal. Any pending timer dies with `self`.
    pub fn retake(self) -> Vec<RevealEvent> {
        tracing::info!(phase = ?self.phase, "reveal discarded for retake");
        vec![RevealEvent::CancelSpeech]
    }

    /// Advance the armed timer to `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        let Some(timer) = self.timer else {
            return events;
        };

        match timer {
            PhaseTimer::Dwell { deadline } => {
                if self.description.is_some() && now >= deadline {
                    self.enter_tension(now, &mut events);
                }
            }
            PhaseTimer::Progress {
                started,
                duration,
                next_fire,
            } => {
                if now < next_fire {
                    return events;
                }
                let elapsed = now.saturating_duration_since(started);
                let pct = if duration.is_zero() {
                    100.0
                } else {
                    (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).min(100.0) as f32
                };
                self.progress = pct;
                events.push(RevealEvent::Progress(pct));

                if pct >= 100.0 {
                    self.enter_revealed(now, &mut events);
                } else {
                    self.timer = Some(PhaseTimer::Progress {
                        started,
                        duration,
                        next_fire: advance(next_fire, now, self.timing.progress_interval).1,
                    });
                }
            }
            PhaseTimer::Typewriter { next_fire } => {
                if now < next_fire {
                    return events;
                }
                let (fires, next) = advance(next_fire, now, self.timing.typewriter_interval);
                self.shown_chars = (self.shown_chars + fires).min(self.total_chars);
                events.push(RevealEvent::TextAdvanced {
                    shown: self.shown_chars,
                    total: self.total_chars,
                });

                if self.shown_chars == self.total_chars {
                    self.timer = None;
                    tracing::debug!("typewriter finished");
                    if !self.muted {
                        if let Some(text) = &self.description {
                            events.push(RevealEvent::Speak(text.clone()));
                        }
                    }
                } else {
                    self.timer = Some(PhaseTimer::Typewriter { next_fire: next });
                }
            }
        }

        events
    }

    fn enter_tension(&mut self, now: Instant, events: &mut Vec<RevealEvent>) {
        let (min, max) = (self.timing.tension_min, self.timing.tension_max);
        let duration = if max > min { self.rng.gen_range(min..max) } else { min };

        self.phase = RevealPhase::Tension;
        self.timer = Some(PhaseTimer::Progress {
            started: now,
            duration,
            next_fire: now + self.timing.progress_interval,
        });
        tracing::info!(duration_ms = duration.as_millis() as u64, "tension started");

        events.push(RevealEvent::PhaseChanged(RevealPhase::Tension));
        events.push(RevealEvent::Cue(Cue::Reveal));
    }

    fn enter_revealed(&mut self, now: Instant, events: &mut Vec<RevealEvent>) {
        self.phase = RevealPhase::Revealed;
        self.timer = Some(PhaseTimer::Typewriter {
            next_fire: now + self.timing.typewriter_interval,
        });
        tracing::info!(rarity = %self.rarity.id, label = self.rarity.label, "verdict revealed");

        events.push(RevealEvent::PhaseChanged(RevealPhase::Revealed));
        events.push(RevealEvent::Cue(Cue::Stamp));
        if self.rarity.id.earns_fanfare() {
            events.push(RevealEvent::Cue(Cue::Fanfare));
        }
    }
}

/// Count interval firings due at `now` (at least one, given `now >= due`)
/// and return the first firing time after `now`.
fn advance(due: Instant, now: Instant, interval: Duration) -> (usize, Instant) {
    if interval.is_zero() {
        return (1, now);
    }
    let late = now.saturating_duration_since(due);
    let fires = (late.as_nanos() / interval.as_nanos()) as usize + 1;
    (fires, due + interval * fires as u32)
}
