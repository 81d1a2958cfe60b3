use async_trait::async_trait;
use bytes::Bytes;
use mosaic_common::config::CaptureConfig;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),
    #[error("ffmpeg exited with non-zero status: {0}")]
    Exit(String),
    #[error("ffmpeg produced no image data")]
    EmptyOutput,
}

/// Grabs a single still frame from a stream address.
///
/// Implementations bound every call by their own timeout.
#[async_trait]
pub trait FrameCapture: Send + Sync {
    async fn capture_frame(&self, address: &str) -> Result<Bytes, CaptureError>;
}

/// Captures thumbnails by running `ffmpeg` and reading a PNG from its stdout.
pub struct FfmpegCapture {
    program: String,
    timeout: Duration,
    seek_secs: u32,
    width: u32,
    height: u32,
}

impl FfmpegCapture {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            program: config.ffmpeg.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            seek_secs: config.seek_secs,
            width: config.width,
            height: config.height,
        }
    }

    fn command(&self, address: &str) -> Command {
        let seek = self.seek_secs.to_string();
        let scale = format!("scale={}:{}", self.width, self.height);

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-i", address,
            "-v", "quiet",
            "-ss", &seek,
            "-y",
            "-t", "1",
            "-vframes", "1",
            "-vf", &scale,
            "-c:v", "png",
            "-f", "image2",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // Dropping the wait future on timeout must not leave ffmpeg running.
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FrameCapture for FfmpegCapture {
    async fn capture_frame(&self, address: &str) -> Result<Bytes, CaptureError> {
        let child = self
            .command(address)
            .spawn()
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))?
            .map_err(|e| CaptureError::Wait(e.to_string()))?;

        if !output.status.success() {
            return Err(CaptureError::Exit(output.status.to_string()));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyOutput);
        }

        debug!(address, bytes = output.stdout.len(), "frame captured");
        Ok(Bytes::from(output.stdout))
    }
}

/// Check whether ffmpeg is runnable. Logs a warning if not; captures will all fail without it.
pub async fn check_ffmpeg_available(program: &str) {
    match Command::new(program).arg("-version").output().await {
        Ok(out) if out.status.success() => {
            debug!(program, "ffmpeg is available");
        }
        Ok(_) => {
            warn!(program, "ffmpeg returned non-zero for -version; captures may fail");
        }
        Err(e) => {
            warn!(
                error = %e,
                program,
                "ffmpeg not found; every thumbnail will render as a placeholder"
            );
        }
    }
}
