use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use vibe_core::{CameraMode, CapturedImage, DescriptionGenerator, GenerateError};

/// How long an external generator may take before its answer is abandoned.
pub const GENERATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs an external program per capture. The image bytes go to stdin; the
/// description is read from stdout. `VIBE_MODE`, `VIBE_IMAGE_MIME` and
/// (when configured) `VIBE_API_KEY` are set in its environment.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn from_command_line(line: &str, api_key: Option<String>) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            api_key,
            timeout: GENERATOR_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, image: &CapturedImage, mode: CameraMode) -> Result<String, GenerateError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("VIBE_MODE", mode.as_str())
            .env("VIBE_IMAGE_MIME", &image.mime)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(key) = &self.api_key {
            cmd.env("VIBE_API_KEY", key);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                GenerateError::Unavailable(format!("{}: {e}", self.program))
            }
            _ => GenerateError::Failed(format!("spawn {}: {e}", self.program)),
        })?;

        // Feed stdin while draining stdout so neither pipe can fill up and
        // stall the other side.
        let stdin = child.stdin.take();
        let feed = async {
            if let Some(mut stdin) = stdin {
                // A generator that ignores stdin may close it early.
                if let Err(e) = stdin.write_all(&image.data).await {
                    tracing::debug!(error = %e, "generator closed stdin early");
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| GenerateError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerateError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(GenerateError::Empty);
        }
        Ok(text)
    }
}

impl DescriptionGenerator for CommandGenerator {
    async fn generate(&self, image: &CapturedImage, mode: CameraMode) -> Result<String, GenerateError> {
        tracing::info!(program = %self.program, %mode, bytes = image.data.len(), "requesting description");
        match tokio::time::timeout(self.timeout, self.run(image, mode)).await {
            Ok(result) => result,
            Err(_) => Err(GenerateError::Failed(format!(
                "{} timed out after {:?}",
                self.program, self.timeout
            ))),
        }
    }
}
