use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Booth configuration: defaults, then `config.toml`, then `VIBE_*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database holding streaks and the stored API key.
    pub db_path: PathBuf,
    /// Text-to-speech command line; empty disables speech.
    pub speech_cmd: String,
    /// External description generator. Receives the JPEG on stdin.
    pub generator_cmd: Option<String>,
    /// API credential handed to the generator. Wins over the stored key.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Start sessions with speech muted.
    pub muted: bool,
    /// Landmark polling rate for the face gate.
    pub detect_hz: u32,
    /// Simulated latency before a canned compliment when no generator is set.
    pub fallback_delay_ms: u64,
    /// Capture countdown length in seconds.
    pub countdown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("booth.db"),
            speech_cmd: "espeak".to_string(),
            generator_cmd: None,
            api_key: None,
            muted: false,
            detect_hz: 60,
            fallback_delay_ms: 2000,
            countdown_secs: 3,
        }
    }
}

impl Config {
    /// Load from the default config file (if present) and the environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("VIBE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `VIBE_*` overrides. Unparseable values keep the current setting.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(path) = var("VIBE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(cmd) = var("VIBE_SPEECH_CMD") {
            self.speech_cmd = cmd;
        }
        if let Some(cmd) = var("VIBE_GENERATOR_CMD") {
            self.generator_cmd = Some(cmd).filter(|c| !c.trim().is_empty());
        }
        if let Some(key) = var("VIBE_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        self.muted = var("VIBE_MUTED").map(|v| v != "0").unwrap_or(self.muted);
        self.detect_hz = env_parse(&var, "VIBE_DETECT_HZ", self.detect_hz);
        self.fallback_delay_ms = env_parse(&var, "VIBE_FALLBACK_DELAY_MS", self.fallback_delay_ms);
        self.countdown_secs = env_parse(&var, "VIBE_COUNTDOWN_SECS", self.countdown_secs);
    }

    /// Gate poll period, clamped to at least 1 Hz.
    pub fn detect_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.detect_hz.max(1) as f64)
    }
}

fn env_parse<T, F>(var: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local/share"))
        .join("vibe")
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("vibe")
}
