//! Local command-line model: prompt on stdin, answer on stdout.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{Provider, ProviderConfig, ProviderError, RawResponse};
use crate::models::enums::{ProviderErrorKind, ProviderKind};
use crate::pipeline::analysis::types::AnalysisRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct CliProvider {
    program: String,
    args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl CliProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let (program, args) = config.command.split_first().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Unavailable, "no command configured")
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            model: config.model_name().to_string(),
            timeout: config.timeout(),
        })
    }

    fn spawn(&self) -> Result<Child, ProviderError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::Unavailable,
                    format!("cannot start {}: {e}", self.program),
                )
            })
    }

    /// Poll until exit or deadline; the child is killed on overrun.
    fn wait_with_deadline(
        &self,
        child: &mut Child,
        deadline: Instant,
    ) -> Result<ExitStatus, ProviderError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProviderError::new(
                        ProviderErrorKind::Timeout,
                        format!("{} exceeded {}s", self.program, self.timeout.as_secs()),
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ProviderError::new(
                        ProviderErrorKind::ProcessFailed,
                        e.to_string(),
                    ));
                }
            }
        }
    }

    /// Pipe contents, bounded by the same deadline as the process. A
    /// descendant that inherited the pipe can hold it open after exit.
    fn collect(&self, output: &Receiver<Vec<u8>>, deadline: Instant) -> Result<Vec<u8>, ProviderError> {
        match output.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(buf) => Ok(buf),
            Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
            Err(RecvTimeoutError::Timeout) => Err(ProviderError::new(
                ProviderErrorKind::Timeout,
                format!(
                    "{} output still open after {}s",
                    self.program,
                    self.timeout.as_secs()
                ),
            )),
        }
    }
}

/// Read a pipe to the end on its own thread; the bytes arrive on the channel.
fn drain<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Answer text from CLI output; a JSON envelope with a `result` string is unwrapped.
pub fn extract_answer(stdout: &str) -> Result<String, ProviderError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::malformed("command produced no output"));
    }
    if let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(trimmed) {
        if let Some(result) = envelope.get("result").and_then(Value::as_str) {
            return Ok(result.to_string());
        }
    }
    Ok(trimmed.to_string())
}

impl Provider for CliProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cli
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;

        let input = format!("{}\n\n{}", request.system.trim(), request.prompt);
        let stdin = child.stdin.take();
        // Not joined: a command that never reads stdin must not stall us.
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_with_deadline(&mut child, deadline)?;

        if !status.success() {
            let err = self.collect(&stderr, deadline).unwrap_or_default();
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            tracing::warn!(
                program = %self.program,
                exit = %code,
                stderr_bytes = err.len(),
                "Analysis command failed"
            );
            return Err(ProviderError::new(
                ProviderErrorKind::ProcessFailed,
                format!("{} exited with {code}", self.program),
            ));
        }

        let out = self.collect(&stdout, deadline)?;
        Ok(RawResponse::Text(String::from_utf8_lossy(&out).into_owned()))
    }

    fn answer_text(&self, raw: &RawResponse) -> Result<String, ProviderError> {
        match raw {
            RawResponse::Text(out) => extract_answer(out),
            RawResponse::Json(v) => extract_answer(&v.to_string()),
        }
    }
}
