//! Inference server process supervision
//!
//! Owns the lifecycle of the child process hosting the inference HTTP
//! service: spawn with piped stdio, readiness probing against /health, and
//! a graceful-then-forced shutdown cascade. Exactly one supervisor owns the
//! process for the whole application session.

use crate::config::SupervisorConfig;
use crate::core::errors::ProcessError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

/// Lifecycle state of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Starting,
    Ready,
    Failed,
    Terminated,
}

/// Supervisor for the child process hosting the inference endpoint
pub struct InferenceServerProcess {
    child: Option<Child>,
    state: watch::Sender<ReadyState>,
    base_url: String,
    http: reqwest::Client,
    settings: SupervisorConfig,
}

impl InferenceServerProcess {
    pub fn new(base_url: impl Into<String>, settings: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(ReadyState::Starting);
        Self {
            child: None,
            state,
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// Observe state transitions; each transition is published exactly once
    pub fn subscribe(&self) -> watch::Receiver<ReadyState> {
        self.state.subscribe()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Launch the server process
    ///
    /// Idempotent: calling while the child is alive is a no-op. Both stdio
    /// pipes are forwarded line by line to the log.
    pub fn start(&mut self, program: &str, args: &[String]) -> Result<(), ProcessError> {
        if self.is_running() {
            tracing::debug!("Inference server already running, start is a no-op");
            return Ok(());
        }

        tracing::info!("Starting inference server: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProcessError::Spawn)?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr");
        }

        self.child = Some(child);
        self.state.send_replace(ReadyState::Starting);
        Ok(())
    }

    /// Wait until the server answers its liveness probe
    ///
    /// Polls GET /health until success, bounded by the configured deadline.
    /// A child exit before readiness and a deadline expiry are distinct
    /// terminal conditions; both leave the state at `Failed`.
    pub async fn wait_ready(&mut self) -> Result<(), ProcessError> {
        if self.state() == ReadyState::Ready {
            return Ok(());
        }

        let deadline = Instant::now() + Duration::from_secs(self.settings.ready_timeout_secs);
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        let url = format!("{}/health", self.base_url);

        loop {
            if let Some(child) = self.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        self.state.send_replace(ReadyState::Failed);
                        return Err(ProcessError::ExitedBeforeReady {
                            status: status.to_string(),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => return Err(ProcessError::Wait(e)),
                }
            }

            match self
                .http
                .get(&url)
                .timeout(Duration::from_secs(1))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    self.state.send_replace(ReadyState::Ready);
                    tracing::info!("Inference server ready at {}", self.base_url);
                    return Ok(());
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                self.state.send_replace(ReadyState::Failed);
                return Err(ProcessError::ReadyTimeout(self.settings.ready_timeout_secs));
            }

            sleep(poll_interval).await;
        }
    }

    /// Stop the server: /shutdown request, bounded wait, kill, bounded wait
    ///
    /// The child may be unresponsive to either channel alone (network stack
    /// wedged, or ignoring termination), so every step escalates. Never
    /// hangs: a child that survives the forced kill is reported as
    /// [`ProcessError::KillTimeout`].
    pub async fn shutdown(&mut self) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.take() else {
            self.state.send_replace(ReadyState::Terminated);
            return Ok(());
        };

        let url = format!("{}/shutdown", self.base_url);
        if let Err(e) = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            tracing::debug!("Shutdown request failed (ignored): {}", e);
        }

        match timeout(
            Duration::from_secs(self.settings.term_wait_secs),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => {
                tracing::info!("Inference server exited gracefully ({})", status);
                self.state.send_replace(ReadyState::Terminated);
                return Ok(());
            }
            Ok(Err(e)) => return Err(ProcessError::Wait(e)),
            Err(_) => {
                tracing::warn!("Inference server did not stop gracefully, killing process");
            }
        }

        child.start_kill().map_err(ProcessError::Kill)?;
        match timeout(
            Duration::from_secs(self.settings.kill_wait_secs),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => {
                tracing::info!("Inference server killed ({})", status);
                self.state.send_replace(ReadyState::Terminated);
                Ok(())
            }
            Ok(Err(e)) => Err(ProcessError::Wait(e)),
            Err(_) => {
                tracing::error!("Failed to kill inference server");
                Err(ProcessError::KillTimeout)
            }
        }
    }
}

/// Forward one stdio pipe to the log; ends (and closes the pipe) at EOF
fn forward_output(stream: impl AsyncRead + Unpin + Send + 'static, label: &'static str) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "inference_server", "[{}] {}", label, line);
        }
    });
}
