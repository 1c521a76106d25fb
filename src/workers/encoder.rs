//! External encoder invocation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use super::error::{PipelineError, PipelineResult};

/// Keep at most this much of the encoder's stderr in errors and logs.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct EncodeOutput {
    pub stderr: String,
    pub elapsed: Duration,
}

/// One invocation of the external encoder with a prepared argument list.
///
/// Implementations must only report success when the process exited with
/// status zero.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, args: &[String]) -> PipelineResult<EncodeOutput>;
}

/// Runs the ffmpeg binary as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, args: &[String]) -> PipelineResult<EncodeOutput> {
        debug!("Running {} {}", self.program.display(), args.join(" "));
        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::EncodeFailed {
                code: "spawn".to_string(),
                stderr: format!("failed to spawn {}: {}", self.program.display(), e),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PipelineError::EncodeFailed {
                    code: "io".to_string(),
                    stderr: format!("waiting for encoder: {}", e),
                });
            }
            Err(_) => {
                return Err(PipelineError::EncodeFailed {
                    code: "timeout".to_string(),
                    stderr: format!("encoder timed out after {:?}", self.timeout),
                });
            }
        };

        let stderr = tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_BYTES);

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            error!("FFmpeg exited with {}: {}", code, stderr);
            return Err(PipelineError::EncodeFailed { code, stderr });
        }

        Ok(EncodeOutput {
            stderr,
            elapsed: started.elapsed(),
        })
    }
}

fn tail(text: &str, max_bytes: usize) -> String {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
