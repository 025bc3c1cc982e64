//! frpc process supervisor.
//!
//! One [`Supervisor`] owns at most one frpc child and its log collector.
//! `start` and `stop` run under a single async mutex and move the
//! [`StateMachine`] through `Stopped → Starting → Running → Stopping →
//! Stopped`; `drain_logs` and `status` never wait on that mutex.

pub mod collector;
pub mod config_writer;
pub mod error;
pub mod log_buffer;
pub mod process;
pub mod state_machine;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use collector::{CollectorExit, LogCollector};
use config_writer::ConfigWriter;
pub use error::SupervisorError;
use log_buffer::LogBuffer;
use state_machine::{State, StateMachine, TransitionError};

/// Result of a successful `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

impl StartOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::AlreadyRunning => "already_running",
        }
    }
}

/// How a `stop` call ended the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was registered; no-op.
    NotRunning,
    /// The child exited after SIGTERM within the stop timeout.
    Graceful { exit_code: Option<i32> },
    /// The child had to be killed.
    Forced,
    /// The child had already exited on its own before the stop.
    AlreadyExited { exit_code: Option<i32> },
}

/// Point-in-time view for `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub state: State,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub config_path: PathBuf,
    pub buffered_lines: usize,
    pub dropped_lines: u64,
    pub buffer_capacity: usize,
}

#[derive(Debug, Clone)]
struct Published {
    state: State,
    pid: Option<u32>,
    started_at: Option<Instant>,
}

struct RunningChild {
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
    collector: JoinHandle<CollectorExit>,
    cancel: CancellationToken,
}

impl Drop for RunningChild {
    fn drop(&mut self) {
        // the child itself is killed by kill_on_drop
        self.cancel.cancel();
    }
}

struct ProcessSlot {
    machine: StateMachine,
    running: Option<RunningChild>,
}

pub struct Supervisor {
    settings: Settings,
    writer: ConfigWriter,
    buffer: Arc<LogBuffer>,
    slot: Mutex<ProcessSlot>,
    published: watch::Sender<Published>,
}

impl Supervisor {
    pub fn new(settings: Settings) -> Self {
        let (published, _) = watch::channel(Published {
            state: State::Stopped,
            pid: None,
            started_at: None,
        });
        Self {
            writer: ConfigWriter::new(settings.config_path()),
            buffer: Arc::new(LogBuffer::with_capacity(settings.log_buffer_size)),
            slot: Mutex::new(ProcessSlot {
                machine: StateMachine::new(),
                running: None,
            }),
            published,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Last published state. May lag behind a child that died on its own
    /// until the next `status`, `start` or `stop`.
    pub fn state(&self) -> State {
        self.published.borrow().state
    }

    /// Write the config and launch frpc unless it is already running.
    ///
    /// Blank configuration text is rejected before anything touches the
    /// filesystem. A child that exited on its own is reaped and replaced.
    pub async fn start(&self, config_text: &str) -> Result<StartOutcome, SupervisorError> {
        tracing::info!("start called with config length={}", config_text.len());
        if config_text.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig("Config is empty".to_string()));
        }

        let mut slot = self.slot.lock().await;
        self.reap_if_exited(&mut slot).await?;

        if slot.machine.state() == State::Running {
            tracing::info!("frpc already running, skipping start");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.transition(&mut slot, State::Starting)?;
        match self.launch(config_text).await {
            Ok(running) => {
                tracing::info!("frpc process started (pid: {:?})", running.pid);
                slot.running = Some(running);
                self.transition(&mut slot, State::Running)?;
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                tracing::error!("start frpc failed: {}", e);
                self.transition(&mut slot, State::Stopped)?;
                Err(e)
            }
        }
    }

    async fn launch(&self, config_text: &str) -> Result<RunningChild, SupervisorError> {
        let written = self
            .writer
            .write(config_text)
            .await
            .map_err(|source| SupervisorError::ConfigWrite {
                path: self.writer.path().to_path_buf(),
                source,
            })?;
        let config_path = absolute(&written)?;

        let binary = &self.settings.binary_path;
        process::ensure_executable(binary);

        let mut cmd = Command::new(binary);
        cmd.arg(&self.settings.mode_flag)
            .arg(&config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
            binary: binary.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        let cancel = CancellationToken::new();
        let collector = LogCollector::new(self.buffer.clone(), cancel.clone()).spawn(stdout, stderr);

        Ok(RunningChild {
            child,
            pid,
            started_at: Instant::now(),
            collector,
            cancel,
        })
    }

    /// Terminate frpc: close stdin, SIGTERM, wait up to the stop timeout,
    /// kill if needed, then join the collector. Calling it with nothing
    /// running is a no-op.
    ///
    /// Only stdin is closed up front. stdout/stderr stay with the collector
    /// so output written while frpc shuts down is still buffered; they close
    /// when the child exits, and the bounded collector join covers a pipe
    /// that some grandchild keeps open.
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        tracing::info!("stop called");
        let mut slot = self.slot.lock().await;
        if slot.running.is_none() {
            return Ok(StopOutcome::NotRunning);
        }

        self.transition(&mut slot, State::Stopping)?;
        let mut running = match slot.running.take() {
            Some(r) => r,
            None => return Ok(StopOutcome::NotRunning),
        };

        let outcome = self.shutdown(&mut running).await;
        self.join_collector(&mut running).await;
        drop(running);

        self.transition(&mut slot, State::Stopped)?;
        tracing::info!("frpc stopped: {:?}", outcome);
        Ok(outcome)
    }

    async fn shutdown(&self, running: &mut RunningChild) -> StopOutcome {
        match running.child.try_wait() {
            Ok(Some(status)) => {
                return StopOutcome::AlreadyExited {
                    exit_code: status.code(),
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to poll frpc status: {}", e),
        }

        // stdout/stderr stay open so shutdown messages still reach the buffer
        drop(running.child.stdin.take());

        let limit = self.settings.stop_timeout();
        match process::request_graceful_exit(running.child.id()) {
            Ok(()) => match tokio::time::timeout(limit, running.child.wait()).await {
                Ok(Ok(status)) => {
                    return StopOutcome::Graceful {
                        exit_code: status.code(),
                    }
                }
                Ok(Err(e)) => tracing::warn!("Failed to wait for frpc: {}", e),
                Err(_) => tracing::warn!("frpc did not exit within {:?}, killing", limit),
            },
            Err(e) => tracing::warn!("Graceful termination unavailable: {}", e),
        }

        if let Err(e) = running.child.kill().await {
            tracing::error!("Failed to kill frpc: {}", e);
        }
        StopOutcome::Forced
    }

    /// Wait for the collector to drain to EOF; cancel it if it lingers (a
    /// grandchild may still hold the pipe) and abort as a last resort.
    async fn join_collector(&self, running: &mut RunningChild) {
        let limit = self.settings.collector_join_timeout();
        let joined = match tokio::time::timeout(limit, &mut running.collector).await {
            Ok(res) => res,
            Err(_) => {
                tracing::debug!("Collector still reading after {:?}, cancelling", limit);
                running.cancel.cancel();
                match tokio::time::timeout(limit, &mut running.collector).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::warn!("Collector did not stop, aborting");
                        running.collector.abort();
                        return;
                    }
                }
            }
        };
        match joined {
            Ok(exit) => tracing::debug!("Collector finished: {:?}", exit),
            Err(e) => tracing::error!("Collector task failed: {}", e),
        }
    }

    /// Reap a child that exited without a stop request so the slot is free
    /// again. Leaves a live child untouched.
    async fn reap_if_exited(&self, slot: &mut ProcessSlot) -> Result<(), SupervisorError> {
        let status = match slot.running.as_mut() {
            Some(running) => match running.child.try_wait() {
                Ok(Some(status)) => status,
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Failed to poll frpc status: {}", e);
                    return Ok(());
                }
            },
            None => return Ok(()),
        };

        if slot.machine.state() == State::Running {
            tracing::warn!("frpc exited without a stop request ({})", status);
            self.transition(slot, State::Crashed)?;
        }
        if let Some(mut running) = slot.running.take() {
            self.join_collector(&mut running).await;
        }
        self.transition(slot, State::Stopped)?;
        Ok(())
    }

    /// Remove and return everything collected so far, one `\n`-terminated
    /// line per entry. Never blocks on start/stop.
    pub fn drain_logs(&self) -> String {
        self.buffer.drain_text()
    }

    pub fn status(&self) -> SupervisorStatus {
        self.refresh();
        let snap = self.published.borrow().clone();
        SupervisorStatus {
            state: snap.state,
            pid: snap.pid,
            uptime_secs: snap.started_at.map(|t| t.elapsed().as_secs()),
            config_path: self.writer.path().to_path_buf(),
            buffered_lines: self.buffer.len(),
            dropped_lines: self.buffer.dropped(),
            buffer_capacity: self.buffer.capacity(),
        }
    }

    /// Mark a dead child as crashed if the slot is not busy.
    fn refresh(&self) {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(_) => return,
        };
        if slot.machine.state() != State::Running {
            return;
        }
        let exited = slot
            .running
            .as_mut()
            .and_then(|r| r.child.try_wait().ok().flatten());
        if let Some(status) = exited {
            tracing::warn!("frpc exited without a stop request ({})", status);
            if let Err(e) = self.transition(&mut slot, State::Crashed) {
                tracing::error!("{}", e);
            }
        }
    }

    fn transition(&self, slot: &mut ProcessSlot, to: State) -> Result<(), TransitionError> {
        slot.machine.transition(to)?;
        let running = slot.running.as_ref();
        self.published.send_replace(Published {
            state: to,
            pid: running.and_then(|r| r.pid),
            started_at: running.map(|r| r.started_at),
        });
        Ok(())
    }
}

fn missing_pipe(name: &str) -> SupervisorError {
    SupervisorError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("child {} was not captured", name),
    ))
}

/// frpc gets an absolute config path regardless of the daemon's cwd.
fn absolute(path: &Path) -> Result<PathBuf, SupervisorError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
