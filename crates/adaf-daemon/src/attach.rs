//! Attach client: target resolution and the subscriber end of the socket.

use adaf_core::session::{Session, SessionStatus};
use adaf_core::store::Store;
use adaf_runner::event::RunnerEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::error::DaemonError;
use crate::protocol::ClientCommand;
use crate::recover::pid_alive;

/// How the operator named the session to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    SessionId(u64),
    LoopName(String),
    /// Zero-argument attach: exactly one running session is required.
    SingleRunning,
}

/// Sessions that currently count as running (status plus a live pid).
fn running_sessions(store: &Store) -> Result<Vec<Session>, DaemonError> {
    Ok(store
        .list_sessions()?
        .records
        .into_iter()
        .filter(|s| {
            matches!(
                s.status,
                SessionStatus::Starting | SessionStatus::Running | SessionStatus::Stopping
            ) && s.pid.is_some_and(pid_alive)
        })
        .collect())
}

/// Resolve an attach target to a session. Ambiguity is an error, not a
/// guess.
pub fn resolve_target(store: &Store, target: &AttachTarget) -> Result<Session, DaemonError> {
    match target {
        AttachTarget::SessionId(id) => Ok(store.get_session(*id)?),
        AttachTarget::LoopName(name) => {
            let mut matches: Vec<Session> = running_sessions(store)?
                .into_iter()
                .filter(|s| s.loop_name == *name)
                .collect();
            match matches.len() {
                0 => Err(DaemonError::NoMatch(format!("loop {name:?}"))),
                1 => Ok(matches.remove(0)),
                n => Err(DaemonError::Ambiguous(n)),
            }
        }
        AttachTarget::SingleRunning => {
            let mut matches = running_sessions(store)?;
            match matches.len() {
                0 => Err(DaemonError::NoMatch("any running session".to_string())),
                1 => Ok(matches.remove(0)),
                n => Err(DaemonError::Ambiguous(n)),
            }
        }
    }
}

/// A connected subscriber.
pub struct AttachClient {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl AttachClient {
    pub async fn connect(socket_path: &std::path::Path) -> Result<Self, DaemonError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| DaemonError::io(format!("connect {socket_path:?}"), e))?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half).lines(),
            writer,
        })
    }

    /// Next event frame; `None` when the daemon closed the stream.
    pub async fn next_event(&mut self) -> Result<Option<RunnerEvent>, DaemonError> {
        loop {
            let Some(line) = self
                .reader
                .next_line()
                .await
                .map_err(|e| DaemonError::io("read event stream", e))?
            else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => {
                    // A frame from a newer daemon; skip rather than die.
                    tracing::warn!(error = %err, "unparseable event frame skipped");
                }
            }
        }
    }

    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), DaemonError> {
        let mut line = serde_json::to_string(command)
            .map_err(|e| DaemonError::Store(adaf_core::StoreError::encode("encode command", e)))?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DaemonError::io("send command", e))
    }
}
