//! An [`OcrEngine`] that runs an external recognizer process.
//!
//! Each call writes the page to a temporary PNG, runs the configured program,
//! and parses its stdout as JSON. This is how a PaddleOCR sidecar script (or
//! any recognizer with a CLI) plugs in without linking its runtime.
//!
//! Arguments may contain two placeholders:
//!
//! | Placeholder | Replaced with |
//! |-------------|---------------|
//! | `{image}`   | path of the temporary PNG |
//! | `{lang}`    | normalized language code |
//!
//! When no argument mentions `{image}`, the path is appended last.
//!
//! With [`CommandEngine::with_timeout`] the child is killed once the deadline
//! passes and the call fails with [`EngineError::ProcessTimedOut`]. Give it
//! the page timeout so a page abandoned by the batch does not leave its
//! recognizer running.

use crate::engine::{ChannelOrder, EngineFactory, EngineImage, OcrEngine};
use crate::error::EngineError;
use crate::pipeline::encode;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const IMAGE_PLACEHOLDER: &str = "{image}";
const LANG_PLACEHOLDER: &str = "{lang}";

/// How often a running recognizer is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Recognizer backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    language: String,
    timeout: Option<Duration>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            language: language.into(),
            timeout: None,
        }
    }

    /// Kill the recognizer if one call takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Arguments for one invocation on `image_path`.
    fn command_args(&self, image_path: &Path) -> Vec<String> {
        let image = image_path.to_string_lossy();
        let mut saw_image = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.contains(IMAGE_PLACEHOLDER) {
                    saw_image = true;
                }
                a.replace(IMAGE_PLACEHOLDER, &image)
                    .replace(LANG_PLACEHOLDER, &self.language)
            })
            .collect();
        if !saw_image {
            args.push(image.into_owned());
        }
        args
    }
}

impl OcrEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn recognize(&self, image: &EngineImage) -> Result<Value, EngineError> {
        let rgb = image.to_rgb_image()?;
        let png = encode::encode_png(&rgb).map_err(|e| EngineError::Image(e.to_string()))?;

        let mut tmpfile = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()?;
        tmpfile.write_all(&png)?;
        tmpfile.flush()?;

        let args = self.command_args(tmpfile.path());
        debug!("Running {} {:?}", self.program, args);

        // stdout and stderr go to unnamed temp files so a chatty child never
        // blocks on a full pipe while we poll it.
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let status = self.wait(child)?;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let stderr = read_all(&mut stderr)?.trim().to_string();
            return Err(EngineError::ProcessFailed {
                program: self.program.clone(),
                code,
                stderr,
            });
        }

        let stdout = read_all(&mut stdout)?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(trimmed)?)
    }
}

impl CommandEngine {
    /// Wait for `child`, killing it once the deadline (if any) has passed.
    fn wait(&self, mut child: Child) -> Result<ExitStatus, EngineError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Recognizer '{}' (pid {}) still running after {}ms; killing it",
                    self.program,
                    child.id(),
                    timeout.as_millis()
                );
                if let Err(e) = child.kill() {
                    debug!("kill failed, child probably exited: {}", e);
                }
                child.wait()?;
                return Err(EngineError::ProcessTimedOut {
                    program: self.program.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_all(file: &mut File) -> Result<String, EngineError> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Builds a [`CommandEngine`] per language, after checking the program exists.
#[derive(Debug, Clone)]
pub struct CommandEngineFactory {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandEngineFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Per-call deadline for every engine this factory builds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl EngineFactory for CommandEngineFactory {
    fn create(&self, language: &str) -> Result<Arc<dyn OcrEngine>, EngineError> {
        if find_program(&self.program).is_none() {
            return Err(EngineError::Unavailable(format!(
                "recognizer program '{}' not found",
                self.program
            )));
        }
        let mut engine = CommandEngine::new(self.program.clone(), self.args.clone(), language);
        if let Some(timeout) = self.timeout {
            engine = engine.with_timeout(timeout);
        }
        Ok(Arc::new(engine))
    }
}

/// Resolve `program` the way a shell would: as a path when it contains a
/// separator, otherwise by searching `PATH`.
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
