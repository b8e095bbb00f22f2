//! Face detection/encoding capability.
//!
//! The hub never runs a detector itself. It hands BGR frames to a
//! [`FaceEncoder`] and receives a list of boxes with embeddings back.

use crate::types::Detection;
use serde::Serialize;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest a single encoder run may take before it is killed.
pub const DEFAULT_ENCODER_TIMEOUT: Duration = Duration::from_secs(10);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("frame buffer has {actual} bytes, expected {expected} for {width}x{height} BGR")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("encoder failed: {0}")]
    Failed(String),
    #[error("encoder output malformed: {0}")]
    MalformedOutput(#[from] serde_json::Error),
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Detects faces in a BGR frame and encodes each one to an embedding.
///
/// Implementations must be deterministic per frame.
pub trait FaceEncoder: Send {
    fn detect_and_encode(
        &mut self,
        bgr: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, EncoderError>;
}

/// Check that a BGR buffer matches its declared dimensions.
pub fn check_frame(bgr: &[u8], width: u32, height: u32) -> Result<(), EncoderError> {
    let expected = width as usize * height as usize * 3;
    if bgr.len() != expected {
        return Err(EncoderError::InvalidFrame {
            width,
            height,
            expected,
            actual: bgr.len(),
        });
    }
    Ok(())
}

/// Stand-in used when no encoder command is configured. Every call fails
/// as `Unavailable`, which the hub records as a device fault.
#[derive(Debug, Default)]
pub struct MissingEncoder;

impl FaceEncoder for MissingEncoder {
    fn detect_and_encode(
        &mut self,
        _bgr: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<Detection>, EncoderError> {
        Err(EncoderError::Unavailable("no encoder command configured".into()))
    }
}

#[derive(Serialize)]
struct FrameHeader<'a> {
    width: u32,
    height: u32,
    format: &'a str,
}

/// Runs an external program once per frame.
///
/// Protocol: the program receives one JSON header line
/// (`{"width":W,"height":H,"format":"bgr24"}`) followed by `W*H*3` raw bytes
/// on stdin, and prints a JSON array of detections
/// (`[{"box":{"x":..,"y":..,"width":..,"height":..},"embedding":[..]}]`)
/// on stdout.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    program: String,
    args: Vec<String>,
    expected_dim: Option<usize>,
    timeout: Duration,
}

impl CommandEncoder {
    /// Build from an argv vector. The first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self, EncoderError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| EncoderError::Unavailable("no encoder command configured".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            expected_dim: None,
            timeout: DEFAULT_ENCODER_TIMEOUT,
        })
    }

    /// Kill the program and fail the frame when a run exceeds `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject embeddings whose length differs from `dim`.
    pub fn with_expected_dim(mut self, dim: usize) -> Self {
        self.expected_dim = Some(dim);
        self
    }
}

impl FaceEncoder for CommandEncoder {
    fn detect_and_encode(
        &mut self,
        bgr: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, EncoderError> {
        check_frame(bgr, width, height)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Unavailable(format!("{}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Unavailable("encoder stdin not captured".into()))?;
        let mut header = serde_json::to_vec(&FrameHeader {
            width,
            height,
            format: "bgr24",
        })?;
        header.push(b'\n');
        let payload = bgr.to_vec();

        // Feed stdin from a separate thread so a chatty child cannot deadlock
        // against a full stdout pipe.
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            stdin.write_all(&header)?;
            stdin.write_all(&payload)?;
            Ok(())
        });

        let stdout = spawn_reader(child.stdout.take(), "stdout")?;
        let stderr = spawn_reader(child.stderr.take(), "stderr")?;

        let Some(status) = wait_deadline(&mut child, self.timeout)
            .map_err(|e| EncoderError::Failed(format!("wait: {e}")))?
        else {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "failed to kill hung encoder");
            }
            let _ = child.wait();
            return Err(EncoderError::Failed(format!(
                "{} timed out after {}ms",
                self.program,
                self.timeout.as_millis()
            )));
        };
        let write_result = writer.join();
        let output_stdout = join_reader(stdout)?;
        let output_stderr = join_reader(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&output_stderr);
            return Err(EncoderError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }
        if let Ok(Err(e)) = write_result {
            tracing::debug!(error = %e, "encoder closed stdin early");
        }

        let detections: Vec<Detection> = serde_json::from_slice(&output_stdout)?;
        if let Some(expected) = self.expected_dim {
            if let Some(bad) = detections.iter().find(|d| d.embedding.dim() != expected) {
                return Err(EncoderError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.dim(),
                });
            }
        }

        tracing::debug!(faces = detections.len(), width, height, "encoder returned detections");
        Ok(detections)
    }
}

type PipeReader = std::thread::JoinHandle<std::io::Result<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>, name: &str) -> Result<PipeReader, EncoderError> {
    let mut pipe = pipe.ok_or_else(|| EncoderError::Unavailable(format!("encoder {name} not captured")))?;
    Ok(std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    }))
}

fn join_reader(reader: PipeReader) -> Result<Vec<u8>, EncoderError> {
    match reader.join() {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(EncoderError::Failed(format!("read: {e}"))),
        Err(_) => Err(EncoderError::Failed("pipe reader panicked".into())),
    }
}

/// Wait for `child` to exit. `None` means the deadline passed first.
fn wait_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    // An unrepresentable deadline means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(None);
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
}
