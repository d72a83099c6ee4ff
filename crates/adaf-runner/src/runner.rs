//! Turn execution.
//!
//! The runner spawns the agent subprocess, streams its stdout line by line,
//! records every raw line verbatim, and watches for interrupt markers
//! between lines. The subprocess seam is the [`AgentLauncher`] trait so the
//! controller can be tested without real providers.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use adaf_core::signal::InterruptKind;
use adaf_core::store::Store;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::build_agent_command;
use crate::error::RunnerError;
use crate::event::{RunnerEvent, StreamEvent};
use crate::recording::RecordingWriter;
use crate::request::TurnRequest;

/// Default marker poll interval; the spec bounds it at 500 ms.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default SIGTERM grace before SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Launcher seam
// ---------------------------------------------------------------------------

/// A running agent subprocess, abstracted for tests.
#[async_trait]
pub trait AgentHandle: Send {
    /// Next raw stdout line; `None` at end of stream.
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError>;

    /// Cooperative termination: SIGTERM, wait up to `grace`, then SIGKILL.
    async fn terminate(&mut self, grace: Duration) -> Result<(), RunnerError>;

    /// Wait for exit and return the exit code (-1 for signal death).
    async fn wait(&mut self) -> Result<i32, RunnerError>;
}

#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, req: &TurnRequest) -> Result<Box<dyn AgentHandle>, RunnerError>;
}

// ---------------------------------------------------------------------------
// Production launcher
// ---------------------------------------------------------------------------

pub struct ProcessLauncher;

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, req: &TurnRequest) -> Result<Box<dyn AgentHandle>, RunnerError> {
        let cmd = build_agent_command(req);
        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .current_dir(&req.workdir)
            .envs(req.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::AgentFailure(format!("spawn {}: {e}", cmd.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::AgentFailure("agent stdout not captured".to_string()))?;

        Ok(Box::new(ProcessHandle {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

struct ProcessHandle {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl AgentHandle for ProcessHandle {
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| RunnerError::io("read agent stdout", e))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), RunnerError> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("agent ignored SIGTERM; killing");
                self.child
                    .start_kill()
                    .map_err(|e| RunnerError::io("kill agent", e))
            }
        }
    }

    async fn wait(&mut self) -> Result<i32, RunnerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| RunnerError::io("wait for agent", e))?;
        Ok(status.code().unwrap_or(-1))
    }
}

// ---------------------------------------------------------------------------
// Mock launcher (tests)
// ---------------------------------------------------------------------------

/// Scripted agent for tests: yields fixed lines with optional delays, then
/// exits with a fixed code.
#[derive(Clone)]
pub struct MockLauncher {
    lines: Vec<(Duration, String)>,
    exit_code: i32,
}

impl MockLauncher {
    pub fn new(lines: Vec<String>, exit_code: i32) -> Self {
        Self {
            lines: lines.into_iter().map(|l| (Duration::ZERO, l)).collect(),
            exit_code,
        }
    }

    pub fn with_delays(lines: Vec<(Duration, String)>, exit_code: i32) -> Self {
        Self { lines, exit_code }
    }
}

#[async_trait]
impl AgentLauncher for MockLauncher {
    async fn launch(&self, _req: &TurnRequest) -> Result<Box<dyn AgentHandle>, RunnerError> {
        Ok(Box::new(MockHandle {
            lines: self.lines.clone(),
            index: 0,
            exit_code: self.exit_code,
            terminated: false,
        }))
    }
}

struct MockHandle {
    lines: Vec<(Duration, String)>,
    index: usize,
    exit_code: i32,
    terminated: bool,
}

#[async_trait]
impl AgentHandle for MockHandle {
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
        if self.terminated || self.index >= self.lines.len() {
            return Ok(None);
        }
        let (delay, ref line) = self.lines[self.index];
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.index += 1;
        Ok(Some(line.clone()))
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<(), RunnerError> {
        self.terminated = true;
        Ok(())
    }

    async fn wait(&mut self) -> Result<i32, RunnerError> {
        Ok(if self.terminated { -1 } else { self.exit_code })
    }
}

// ---------------------------------------------------------------------------
// Turn outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(String),
    Interrupted(InterruptKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct TurnRunner {
    store: Store,
    launcher: Arc<dyn AgentLauncher>,
    poll_interval: Duration,
    grace: Duration,
}

impl TurnRunner {
    pub fn new(store: Store, launcher: Arc<dyn AgentLauncher>) -> Self {
        Self {
            store,
            launcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.min(Duration::from_millis(500));
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Execute one turn: stream events to `events`, record raw output, and
    /// honor interrupt markers and the cancel token.
    pub async fn run(
        &self,
        req: &TurnRequest,
        events: &mpsc::Sender<RunnerEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, RunnerError> {
        let started = tokio::time::Instant::now();

        send(events, RunnerEvent::AgentStarted {
            turn_id: req.turn_id,
            agent: req.agent.as_str().to_string(),
            model: req.model.clone(),
        })
        .await;
        send(events, RunnerEvent::AgentPrompt {
            turn_id: req.turn_id,
            prompt: req.prompt.clone(),
        })
        .await;

        let mut recording = RecordingWriter::create(&self.store.recording_path(req.turn_id))?;
        let mut handle = self.launcher.launch(req).await?;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let interrupted = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(turn = req.turn_id, "cancel token fired mid-turn");
                    break Some(InterruptKind::UserAbort);
                }
                _ = poll.tick() => {
                    if let Some(kind) =
                        self.store.pending_interrupt(req.session_id, req.turn_id)?
                    {
                        debug!(turn = req.turn_id, kind = %kind, "interrupt marker observed");
                        break Some(kind);
                    }
                }
                line = handle.next_line() => {
                    match line? {
                        Some(line) => {
                            recording.append_line(&line)?;
                            send(events, RunnerEvent::AgentRawOutput {
                                turn_id: req.turn_id,
                                line: line.clone(),
                            })
                            .await;
                            if let Some(event) = StreamEvent::parse_line(&line) {
                                let stream_done = event == StreamEvent::MessageStop;
                                send(events, RunnerEvent::AgentEvent {
                                    turn_id: req.turn_id,
                                    event,
                                })
                                .await;
                                if stream_done {
                                    send(events, RunnerEvent::AgentLoopDone {
                                        turn_id: req.turn_id,
                                    })
                                    .await;
                                }
                            }
                        }
                        None => break None,
                    }
                }
            }
        };

        let outcome = match interrupted {
            Some(kind) => {
                handle.terminate(self.grace).await?;
                recording.mark_truncated()?;
                TurnOutcome::Interrupted(kind)
            }
            None => {
                let exit = handle.wait().await?;
                if exit == 0 {
                    TurnOutcome::Completed
                } else {
                    TurnOutcome::Failed(format!("agent exited with status {exit}"))
                }
            }
        };
        recording.flush()?;

        let error = match &outcome {
            TurnOutcome::Completed => None,
            TurnOutcome::Failed(msg) => Some(msg.clone()),
            TurnOutcome::Interrupted(kind) => Some(format!("interrupted: {kind}")),
        };
        send(events, RunnerEvent::AgentFinished {
            turn_id: req.turn_id,
            error,
        })
        .await;

        Ok(TurnResult {
            outcome,
            duration: started.elapsed(),
        })
    }
}

/// Event delivery is best-effort: a gone subscriber must not fail the turn.
async fn send(events: &mpsc::Sender<RunnerEvent>, event: RunnerEvent) {
    let _ = events.send(event).await;
}
