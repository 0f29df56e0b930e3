use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use vibe_core::credential::resolve_credential;
use vibe_core::{
    capture_allowed, CameraMode, CapturedResult, Cue, FacePresenceGate, KeyValueStore, RarityTable,
    ResilientGenerator, RevealEvent, RevealOrchestrator, RevealPhase, RevealTiming, StreakTracker,
};
use vibe_hw::{
    open_cue_player, CommandSpeech, CuePlayer, FileImageSource, ImageSource, LandmarkDetector,
    ScriptedDetector, SilentPlayer, SpeechOutput, SpeechSlot, SyntheticFace, UnavailableCamera,
};

use crate::config::Config;
use crate::generator::CommandGenerator;
use crate::terminal::{self, Typewriter};

/// Pause between the shutter and the reveal starting.
const FLASH_DELAY: Duration = Duration::from_millis(150);
/// How long to wait for the gate thread's first verdict.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_millis(500);
/// Poll period while waiting for speech to finish.
const SPEECH_POLL: Duration = Duration::from_millis(100);

pub struct SessionOptions {
    pub mode: CameraMode,
    pub image: Option<PathBuf>,
    pub landmarks: Option<PathBuf>,
    /// Use a synthetic, centred face instead of a landmark script.
    pub assume_face: bool,
    pub mute: bool,
    /// No cue sounds.
    pub quiet: bool,
}

pub enum SessionOutcome {
    Revealed(CapturedResult),
    /// Solo capture attempted without a framed face.
    Rejected,
    /// Quit before the reveal finished; everything was discarded.
    Discarded,
}

/// Requests from the person at the booth while a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ToggleMute,
    /// Discard the current take and go back to the countdown.
    Retake,
    Quit,
}

impl Control {
    /// Typed commands: `m` toggles sound, `r` retakes, `q` quits.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "m" | "mute" => Some(Control::ToggleMute),
            "r" | "retake" => Some(Control::Retake),
            "q" | "quit" => Some(Control::Quit),
            _ => None,
        }
    }
}

/// Control input for a session: Ctrl-C quits, and on a terminal typed lines
/// are parsed with [`Control::from_line`].
pub struct Controls {
    rx: mpsc::UnboundedReceiver<Control>,
    open: bool,
    interactive: bool,
}

impl Controls {
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<Control>) -> Self {
        Self {
            rx,
            open: true,
            interactive: false,
        }
    }

    /// Ctrl-C plus, when stdin is a terminal, a line reader on its own
    /// thread. Must be called inside the runtime.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let signal_tx = tx.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if signal_tx.send(Control::Quit).is_err() {
                    break;
                }
            }
        });

        let interactive = std::io::stdin().is_terminal();
        if interactive {
            // Blocking stdin reads stay off the runtime so shutdown never
            // waits on a pending line.
            std::thread::Builder::new()
                .name("vibe-input".into())
                .spawn(move || {
                    for line in std::io::stdin().lock().lines() {
                        let Ok(line) = line else { break };
                        if let Some(control) = Control::from_line(&line) {
                            if tx.send(control).is_err() {
                                break;
                            }
                        }
                    }
                })
                .context("failed to spawn input thread")?;
        }

        let mut controls = Self::from_receiver(rx);
        controls.interactive = interactive;
        Ok(controls)
    }

    /// Next control. Pends forever once every sender is gone.
    async fn next(&mut self) -> Control {
        if self.open {
            if let Some(control) = self.rx.recv().await {
                return control;
            }
            self.open = false;
        }
        std::future::pending().await
    }

    /// Sleep for `duration`, applying mute toggles along the way. Returns
    /// early with a retake or quit.
    async fn pause(&mut self, duration: Duration, muted: &mut bool) -> Option<Control> {
        let until = tokio::time::Instant::now() + duration;
        loop {
            let control = tokio::select! {
                _ = tokio::time::sleep_until(until) => return None,
                control = self.next() => control,
            };
            match control {
                Control::ToggleMute => toggle_mute(muted),
                other => return Some(other),
            }
        }
    }
}

fn toggle_mute(muted: &mut bool) {
    *muted = !*muted;
    announce_mute(*muted);
}

fn announce_mute(muted: bool) {
    println!("{}", if muted { "(sound off)" } else { "(sound on)" });
    tracing::info!(muted, "mute toggled");
}

/// Face-gate poller on a dedicated thread. The latest verdict is always
/// available through the watch channel.
pub struct GateHandle {
    rx: watch::Receiver<bool>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl GateHandle {
    pub fn spawn(detector: Option<Box<dyn LandmarkDetector + Send>>, interval: Duration) -> Result<Self> {
        let (tx, rx) = watch::channel(false);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = std::thread::Builder::new()
            .name("vibe-gate".into())
            .spawn(move || {
                let mut gate = if detector.is_some() {
                    FacePresenceGate::new()
                } else {
                    tracing::warn!("no landmark detector; face gate reports false");
                    FacePresenceGate::unavailable()
                };
                let mut detector = detector;
                tracing::info!(interval_ms = interval.as_millis() as u64, "gate thread started");

                while !stop_flag.load(Ordering::Relaxed) {
                    let faces = detector.as_mut().map(|d| d.detect()).unwrap_or_default();
                    gate.poll(&faces, |framed| {
                        tx.send_replace(framed);
                    });
                    std::thread::sleep(interval);
                }
                tracing::info!(frames = gate.frames_seen(), "gate thread exiting");
            })
            .context("failed to spawn gate thread")?;

        Ok(Self {
            rx,
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_framed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the gate has published at least once (or give up).
    pub async fn first_frame(&mut self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.rx.changed()).await.is_err() {
            tracing::warn!("face gate produced no frame in time");
        }
        self.is_framed()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("gate thread panicked");
            }
        }
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns everything that must be torn down when a session ends, however it
/// ends: pending speech and the gate thread.
struct SessionGuard<S: SpeechOutput> {
    speech: SpeechSlot<S>,
    gate: GateHandle,
}

impl<S: SpeechOutput> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.speech.cancel();
        self.gate.stop();
        tracing::debug!("session torn down");
    }
}

fn build_detector(opts: &SessionOptions) -> Result<Option<Box<dyn LandmarkDetector + Send>>> {
    if let Some(path) = &opts.landmarks {
        let detector = ScriptedDetector::load(path)?;
        return Ok(Some(Box::new(detector)));
    }
    if opts.assume_face {
        return Ok(Some(Box::new(SyntheticFace::centered())));
    }
    Ok(None)
}

fn build_camera(opts: &SessionOptions) -> Result<Box<dyn ImageSource>> {
    let camera: Box<dyn ImageSource> = match &opts.image {
        Some(path) => Box::new(FileImageSource::open(path)?),
        None => Box::new(UnavailableCamera::new("no image source; pass --image")),
    };
    Ok(camera)
}

fn build_speech(config: &Config) -> SpeechSlot<CommandSpeech> {
    match CommandSpeech::from_command_line(&config.speech_cmd) {
        Some(speech) => SpeechSlot::new(speech),
        None => {
            tracing::info!("speech disabled");
            SpeechSlot::disabled()
        }
    }
}

fn build_cues(opts: &SessionOptions) -> Box<dyn CuePlayer> {
    if opts.quiet {
        Box::new(SilentPlayer)
    } else {
        open_cue_player()
    }
}

fn reject() -> SessionOutcome {
    println!("Face not clear! Please position your face in the frame.");
    tracing::info!("capture rejected: face not framed");
    SessionOutcome::Rejected
}

/// How a reveal stopped.
enum RevealEnd {
    Complete(RevealOrchestrator),
    /// Carries the orchestrator's teardown events.
    Retake(Vec<RevealEvent>),
    Quit(Vec<RevealEvent>),
}

enum Wake {
    Text(String),
    Deadline,
    Control(Control),
}

/// Wait for the description, then run the staged reveal.
///
/// The orchestrator is created only once the text has arrived, so the
/// analyzing dwell always plays out in full after generation. Every event is
/// handed to `render` along with the orchestrator that produced it.
async fn drive_reveal<G, F>(
    generation: G,
    table: &RarityTable,
    timing: RevealTiming,
    muted: &mut bool,
    controls: &mut Controls,
    mut render: F,
) -> RevealEnd
where
    G: Future<Output = String>,
    F: FnMut(&RevealOrchestrator, RevealEvent),
{
    tokio::pin!(generation);
    let text = loop {
        let wake = tokio::select! {
            text = &mut generation => Wake::Text(text),
            control = controls.next() => Wake::Control(control),
        };
        match wake {
            Wake::Text(text) => break text,
            Wake::Control(Control::ToggleMute) => toggle_mute(muted),
            Wake::Control(Control::Retake) => return RevealEnd::Retake(Vec::new()),
            Wake::Control(Control::Quit) => return RevealEnd::Quit(Vec::new()),
            Wake::Deadline => {}
        }
    };

    let mut reveal = RevealOrchestrator::with_rng(table, timing, Instant::now(), StdRng::from_entropy());
    for event in reveal.set_muted(*muted) {
        render(&reveal, event);
    }
    reveal.on_description(text);

    while !reveal.is_complete() {
        let Some(deadline) = reveal.next_deadline() else {
            tracing::warn!(phase = ?reveal.phase(), "reveal stalled without a description");
            return RevealEnd::Quit(reveal.retake());
        };
        let wake = tokio::select! {
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => Wake::Deadline,
            control = controls.next() => Wake::Control(control),
        };
        match wake {
            Wake::Deadline | Wake::Text(_) => {}
            Wake::Control(Control::ToggleMute) => {
                let events = reveal.set_muted(!reveal.is_muted());
                *muted = reveal.is_muted();
                announce_mute(*muted);
                for event in events {
                    render(&reveal, event);
                }
                continue;
            }
            Wake::Control(Control::Retake) => return RevealEnd::Retake(reveal.retake()),
            Wake::Control(Control::Quit) => return RevealEnd::Quit(reveal.retake()),
        }

        for event in reveal.tick(Instant::now()) {
            render(&reveal, event);
        }
    }
    RevealEnd::Complete(reveal)
}

/// Terminal and device output for one reveal.
struct RevealView<'a, S: SpeechOutput> {
    speech: &'a mut SpeechSlot<S>,
    cues: &'a dyn CuePlayer,
    typewriter: Option<Typewriter<fn(&str) -> String>>,
}

impl<S: SpeechOutput> RevealView<'_, S> {
    fn render(&mut self, reveal: &RevealOrchestrator, event: RevealEvent) {
        match event {
            RevealEvent::PhaseChanged(RevealPhase::Tension) => {
                println!("Calculating rarity...");
            }
            RevealEvent::PhaseChanged(RevealPhase::Revealed) => {
                println!();
                println!("{}", terminal::stamp(reveal.rarity()));
                self.typewriter = reveal
                    .description()
                    .map(|text| Typewriter::new(text, terminal::ansi_mark as fn(&str) -> String));
            }
            RevealEvent::PhaseChanged(RevealPhase::Analyzing) => {}
            RevealEvent::Progress(pct) => {
                print!("\r{}", terminal::progress_bar(pct));
            }
            RevealEvent::Cue(cue) => self.cues.play(cue),
            RevealEvent::TextAdvanced { shown, total } => {
                if let Some(tw) = self.typewriter.as_mut() {
                    print!("{}", tw.advance(shown));
                }
                if shown == total {
                    println!();
                }
            }
            RevealEvent::Speak(text) => self.speech.speak(&text),
            RevealEvent::CancelSpeech => self.speech.cancel(),
        }
        let _ = std::io::stdout().flush();
    }
}

/// Run a session with Ctrl-C and typed controls.
pub async fn run<S: KeyValueStore>(config: &Config, opts: SessionOptions, store: &mut S) -> Result<SessionOutcome> {
    let controls = Controls::spawn()?;
    run_with(config, opts, store, controls, RevealTiming::default()).await
}

async fn run_with<S: KeyValueStore>(
    config: &Config,
    opts: SessionOptions,
    store: &mut S,
    mut controls: Controls,
    timing: RevealTiming,
) -> Result<SessionOutcome> {
    let streak = StreakTracker::new(&mut *store).record_visit(&chrono::Local::now());
    if streak.count > 1 {
        println!("Streak: {} days in a row", streak.count);
    } else {
        println!("Streak: day 1");
    }

    let credential = resolve_credential(config.api_key.clone(), &*store);
    let generator = match config.generator_cmd.as_deref() {
        Some(line) => CommandGenerator::from_command_line(
            line,
            credential.as_ref().map(|c| c.secret().to_string()),
        )
        .map(ResilientGenerator::new)
        .unwrap_or_else(ResilientGenerator::fallback_only),
        None => ResilientGenerator::fallback_only(),
    };

    let mut camera = build_camera(&opts)?;
    let mut guard = SessionGuard {
        speech: build_speech(config),
        gate: GateHandle::spawn(build_detector(&opts)?, config.detect_interval())?,
    };
    let cues = build_cues(&opts);
    let table = RarityTable::standard();
    let fallback_delay = Duration::from_millis(config.fallback_delay_ms);
    let mut muted = config.muted || opts.mute;

    if controls.interactive {
        println!("Type m + Enter to toggle sound, r + Enter to retake, q + Enter to quit.");
    }

    let framed = guard.gate.first_frame(FIRST_FRAME_TIMEOUT).await;
    if !capture_allowed(opts.mode, framed) {
        return Ok(reject());
    }

    'take: loop {
        for n in (1..=config.countdown_secs).rev() {
            println!("{n}...");
            match controls.pause(Duration::from_secs(1), &mut muted).await {
                Some(Control::Quit) => return Ok(SessionOutcome::Discarded),
                Some(Control::Retake) => continue 'take,
                _ => {}
            }
        }
        if !capture_allowed(opts.mode, guard.gate.is_framed()) {
            return Ok(reject());
        }

        cues.play(Cue::Shutter);
        let frame = camera.capture().context("capture failed")?;
        tracing::info!(take = frame.sequence, width = frame.width, height = frame.height, "captured");
        if let Some(notice) = frame.notice() {
            println!("{notice}");
        }
        let image = frame.into_captured();
        tokio::time::sleep(FLASH_DELAY).await;
        println!("Analyzing...");

        let end = {
            let generation = async {
                if !generator.has_backend() {
                    tokio::time::sleep(fallback_delay).await;
                }
                generator.describe(&image, opts.mode).await
            };
            let mut view = RevealView {
                speech: &mut guard.speech,
                cues: cues.as_ref(),
                typewriter: None,
            };
            drive_reveal(generation, &table, timing, &mut muted, &mut controls, |reveal, event| {
                view.render(reveal, event)
            })
            .await
        };

        let reveal = match end {
            RevealEnd::Complete(reveal) => reveal,
            RevealEnd::Retake(cleanup) => {
                discard(&mut guard.speech, cleanup);
                println!("Retake!");
                continue 'take;
            }
            RevealEnd::Quit(cleanup) => {
                discard(&mut guard.speech, cleanup);
                return Ok(SessionOutcome::Discarded);
            }
        };

        // Let the verdict finish speaking; a retake or quit cuts it short.
        while guard.speech.is_speaking() {
            match controls.pause(SPEECH_POLL, &mut muted).await {
                Some(Control::Retake) => {
                    guard.speech.cancel();
                    println!("Retake!");
                    continue 'take;
                }
                Some(Control::Quit) => break,
                Some(Control::ToggleMute) => unreachable!("pause applies mute toggles itself"),
                None if muted => guard.speech.cancel(),
                None => {}
            }
        }

        let description = reveal.description().unwrap_or_default().to_string();
        let result = CapturedResult::new(image, opts.mode, description, reveal.rarity().clone());
        tracing::info!(id = %result.id, rarity = %result.rarity.id, mode = %result.mode, "session complete");
        return Ok(SessionOutcome::Revealed(result));
    }
}

fn discard<S: SpeechOutput>(speech: &mut SpeechSlot<S>, cleanup: Vec<RevealEvent>) {
    println!();
    for event in cleanup {
        if event == RevealEvent::CancelSpeech {
            speech.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[tokio::test]
    async fn test_gate_publishes_framed_face() {
        let mut gate = GateHandle::spawn(
            Some(Box::new(SyntheticFace::centered())),
            Duration::from_millis(5),
        )
        .unwrap();
        assert!(gate.first_frame(Duration::from_secs(2)).await);
        gate.stop();
    }

    #[tokio::test]
    async fn test_gate_without_detector_reports_false() {
        let mut gate = GateHandle::spawn(None, Duration::from_millis(5)).unwrap();
        assert!(!gate.first_frame(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_gate_follows_script() {
        let script = ScriptedDetector::from_json(
            r#"[[[{"x": 0.3, "y": 0.3}, {"x": 0.7, "y": 0.7}]], []]"#,
        )
        .unwrap();
        let mut gate = GateHandle::spawn(Some(Box::new(script)), Duration::from_millis(5)).unwrap();
        gate.first_frame(Duration::from_secs(2)).await;
        // The script holds its last (empty) frame.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!gate.is_framed());
    }

    #[test]
    fn test_detector_selection() {
        let opts = SessionOptions {
            mode: CameraMode::Solo,
            image: None,
            landmarks: None,
            assume_face: false,
            mute: true,
            quiet: true,
        };
        assert!(build_detector(&opts).unwrap().is_none());
        let opts = SessionOptions {
            assume_face: true,
            ..opts
        };
        assert!(build_detector(&opts).unwrap().is_some());
    }

    #[test]
    fn test_camera_without_image_is_unavailable() {
        let opts = SessionOptions {
            mode: CameraMode::Friends,
            image: None,
            landmarks: None,
            assume_face: false,
            mute: true,
            quiet: true,
        };
        let mut camera = build_camera(&opts).unwrap();
        assert!(camera.capture().is_err());
    }

    fn fast_timing() -> RevealTiming {
        RevealTiming {
            tension_min: Duration::from_millis(100),
            tension_max: Duration::from_millis(100),
            progress_interval: Duration::from_millis(20),
            typewriter_interval: Duration::from_millis(1),
            ..RevealTiming::default()
        }
    }

    /// Controls with nobody on the other end.
    fn idle_controls() -> Controls {
        let (_tx, rx) = mpsc::unbounded_channel();
        Controls::from_receiver(rx)
    }

    /// Controls fed by a script of (delay from start, control) pairs.
    fn scripted_controls(script: Vec<(u64, Control)>) -> Controls {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (at, control) in script {
                tokio::time::sleep_until(start + Duration::from_millis(at)).await;
                let _ = tx.send(control);
            }
            // Keep the channel open until the test is done with it.
            std::future::pending::<()>().await;
        });
        Controls::from_receiver(rx)
    }

    #[derive(Default)]
    struct SpeechLog {
        calls: Vec<String>,
        speaking: bool,
    }

    struct RecordingSpeech(Rc<RefCell<SpeechLog>>);

    impl SpeechOutput for RecordingSpeech {
        fn speak(&mut self, text: &str) -> Result<(), vibe_hw::SpeechError> {
            let mut log = self.0.borrow_mut();
            log.calls.push(format!("speak:{text}"));
            log.speaking = true;
            Ok(())
        }

        fn cancel(&mut self) -> Result<(), vibe_hw::SpeechError> {
            let mut log = self.0.borrow_mut();
            log.calls.push("cancel".into());
            log.speaking = false;
            Ok(())
        }

        fn is_speaking(&mut self) -> bool {
            self.0.borrow().speaking
        }
    }

    fn recording_slot() -> (SpeechSlot<RecordingSpeech>, Rc<RefCell<SpeechLog>>) {
        let log = Rc::new(RefCell::new(SpeechLog::default()));
        (SpeechSlot::new(RecordingSpeech(log.clone())), log)
    }

    /// Reports a centred face and raises a flag when the gate thread drops it.
    struct DropFlagDetector(Arc<AtomicBool>);

    impl LandmarkDetector for DropFlagDetector {
        fn detect(&mut self) -> Vec<vibe_core::LandmarkSet> {
            SyntheticFace::centered().detect()
        }
    }

    impl Drop for DropFlagDetector {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn temp_photo(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vibe-{tag}-{}.png", std::process::id()));
        image::RgbImage::from_pixel(8, 8, image::Rgb([120, 90, 200]))
            .save(&path)
            .unwrap();
        path
    }

    fn fast_config() -> Config {
        Config {
            speech_cmd: String::new(),
            countdown_secs: 0,
            fallback_delay_ms: 0,
            detect_hz: 200,
            ..Config::default()
        }
    }

    fn friends(image: Option<PathBuf>) -> SessionOptions {
        SessionOptions {
            mode: CameraMode::Friends,
            image,
            landmarks: None,
            assume_face: false,
            mute: true,
            quiet: true,
        }
    }

    #[test]
    fn test_control_from_line() {
        assert_eq!(Control::from_line("m\n"), Some(Control::ToggleMute));
        assert_eq!(Control::from_line(" Retake "), Some(Control::Retake));
        assert_eq!(Control::from_line("q"), Some(Control::Quit));
        assert_eq!(Control::from_line("hello"), None);
        assert_eq!(Control::from_line(""), None);
    }

    #[tokio::test]
    async fn test_dwell_starts_when_description_arrives() {
        let text_at = Cell::new(None);
        let generation = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            text_at.set(Some(Instant::now()));
            "You glow".to_string()
        };
        let mut seen = Vec::new();
        let mut controls = idle_controls();
        let mut muted = true;

        let end = drive_reveal(
            generation,
            &RarityTable::standard(),
            fast_timing(),
            &mut muted,
            &mut controls,
            |_, event| seen.push((Instant::now(), event)),
        )
        .await;

        assert!(matches!(end, RevealEnd::Complete(ref r) if r.description() == Some("You glow")));
        let text_at = text_at.get().unwrap();
        let (tension_at, _) = seen
            .iter()
            .find(|(_, e)| *e == RevealEvent::PhaseChanged(RevealPhase::Tension))
            .unwrap();
        assert!(*tension_at >= text_at + Duration::from_millis(1500));
        assert!(seen.iter().any(|(_, e)| *e == RevealEvent::PhaseChanged(RevealPhase::Revealed)));
    }

    #[tokio::test]
    async fn test_quit_mid_tension_cancels_speech() {
        let (mut slot, log) = recording_slot();
        slot.speak("previous verdict");
        let timing = RevealTiming {
            dwell: Duration::from_millis(50),
            tension_min: Duration::from_secs(2),
            tension_max: Duration::from_secs(2),
            ..RevealTiming::default()
        };
        let mut controls = scripted_controls(vec![(400, Control::Quit)]);
        let mut muted = false;
        let mut phases = Vec::new();

        let end = {
            let mut view = RevealView {
                speech: &mut slot,
                cues: &SilentPlayer,
                typewriter: None,
            };
            drive_reveal(
                async { "never shown".to_string() },
                &RarityTable::standard(),
                timing,
                &mut muted,
                &mut controls,
                |reveal, event| {
                    if let RevealEvent::PhaseChanged(phase) = event {
                        phases.push(phase);
                    }
                    view.render(reveal, event)
                },
            )
            .await
        };

        assert_eq!(phases, vec![RevealPhase::Tension]);
        let RevealEnd::Quit(cleanup) = end else {
            panic!("expected the reveal to stop on quit");
        };
        assert_eq!(cleanup, vec![RevealEvent::CancelSpeech]);
        discard(&mut slot, cleanup);
        assert_eq!(log.borrow().calls.last().map(String::as_str), Some("cancel"));
        assert!(!slot.is_speaking());
    }

    #[tokio::test]
    async fn test_mute_toggle_and_retake_mid_reveal() {
        let (mut slot, log) = recording_slot();
        let timing = RevealTiming {
            dwell: Duration::from_millis(50),
            tension_min: Duration::from_secs(2),
            tension_max: Duration::from_secs(2),
            ..RevealTiming::default()
        };
        let mut controls =
            scripted_controls(vec![(200, Control::ToggleMute), (400, Control::Retake)]);
        let mut muted = false;

        let end = {
            let mut view = RevealView {
                speech: &mut slot,
                cues: &SilentPlayer,
                typewriter: None,
            };
            drive_reveal(
                async { "again".to_string() },
                &RarityTable::standard(),
                timing,
                &mut muted,
                &mut controls,
                |reveal, event| view.render(reveal, event),
            )
            .await
        };

        assert!(muted);
        assert!(matches!(end, RevealEnd::Retake(ref cleanup) if *cleanup == vec![RevealEvent::CancelSpeech]));
        // Muting mid-reveal cancelled speech through the view.
        assert_eq!(log.borrow().calls, vec!["cancel".to_string()]);
    }

    #[tokio::test]
    async fn test_quit_while_generating_discards_without_reveal() {
        let mut controls = scripted_controls(vec![(50, Control::Quit)]);
        let mut muted = false;
        let mut events = 0;
        let end = drive_reveal(
            std::future::pending::<String>(),
            &RarityTable::standard(),
            fast_timing(),
            &mut muted,
            &mut controls,
            |_, _| events += 1,
        )
        .await;
        assert!(matches!(end, RevealEnd::Quit(ref cleanup) if cleanup.is_empty()));
        assert_eq!(events, 0);
    }

    #[tokio::test]
    async fn test_guard_drop_cancels_speech_and_joins_gate() {
        let (mut slot, log) = recording_slot();
        slot.speak("mid verdict");
        let dropped = Arc::new(AtomicBool::new(false));
        let mut gate = GateHandle::spawn(
            Some(Box::new(DropFlagDetector(dropped.clone()))),
            Duration::from_millis(5),
        )
        .unwrap();
        assert!(gate.first_frame(Duration::from_secs(2)).await);

        let guard = SessionGuard { speech: slot, gate };
        drop(guard);

        assert!(log.borrow().calls.contains(&"cancel".to_string()));
        assert!(!log.borrow().speaking);
        // The detector lives on the gate thread, so it is gone only once the
        // thread has been joined.
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_friends_session_reveals_with_fallback() {
        let path = temp_photo("reveal");
        let mut store = vibe_core::MemoryStore::new();
        let outcome = run_with(&fast_config(), friends(Some(path.clone())), &mut store, idle_controls(), fast_timing())
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();

        match outcome {
            SessionOutcome::Revealed(result) => {
                assert!(vibe_core::generator::FALLBACK_COMPLIMENTS.contains(&result.description.as_str()));
                assert_eq!(result.mode, CameraMode::Friends);
                assert_eq!(result.image.mime, "image/jpeg");
            }
            _ => panic!("expected a reveal"),
        }
        assert_eq!(store.get(vibe_core::streak::STREAK_KEY).unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_session_quit_during_tension_is_discarded() {
        let path = temp_photo("quit");
        let timing = RevealTiming {
            tension_min: Duration::from_secs(3),
            tension_max: Duration::from_secs(3),
            ..fast_timing()
        };
        let mut store = vibe_core::MemoryStore::new();
        let started = Instant::now();
        // Shutter, flash and the 1.5 s dwell are over by 2.5 s.
        let controls = scripted_controls(vec![(2500, Control::Quit)]);
        let outcome = run_with(&fast_config(), friends(Some(path.clone())), &mut store, controls, timing)
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert!(matches!(outcome, SessionOutcome::Discarded));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_session_retake_captures_again() {
        let path = temp_photo("retake");
        let timing = RevealTiming {
            tension_min: Duration::from_secs(1),
            tension_max: Duration::from_secs(1),
            ..fast_timing()
        };
        let mut store = vibe_core::MemoryStore::new();
        let started = Instant::now();
        // Lands in the first take's tension phase.
        let controls = scripted_controls(vec![(2000, Control::Retake)]);
        let outcome = run_with(&fast_config(), friends(Some(path.clone())), &mut store, controls, timing)
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert!(matches!(outcome, SessionOutcome::Revealed(_)));
        // A single take finishes in under 3 s; the second take restarts the
        // flash, dwell and tension after the retake.
        assert!(started.elapsed() >= Duration::from_millis(4000));
        // The streak is recorded once per session, not per take.
        assert_eq!(store.get(vibe_core::streak::STREAK_KEY).unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_solo_session_without_face_is_rejected() {
        let opts = SessionOptions {
            mode: CameraMode::Solo,
            ..friends(None)
        };
        let mut store = vibe_core::MemoryStore::new();
        let outcome = run_with(&fast_config(), opts, &mut store, idle_controls(), fast_timing())
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Rejected));
    }
}
