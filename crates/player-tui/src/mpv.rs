/// mpv process supervision and the IPC control channel.
///
/// ```text
///   EngineSupervisor   owns at most one child:  Idle → Running → (exited | stopped) → Idle
///         │
///         └── mpv --input-ipc-server=<socket> --volume=N -- <track>
///                         ▲
///   ControlChannel  ──────┘  lazy connect, fire-and-forget commands,
///                            bounded two-property query per tick
/// ```
///
/// Nothing here runs in the background: every call completes (or times out)
/// before returning to the loop.
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use player_proto::catalog::TrackIndex;
use player_proto::platform;
use player_proto::protocol::{EngineCommand, ReplyAssembler};

/// How long a terminated engine gets before it is killed outright.
const STOP_GRACE: Duration = Duration::from_millis(500);

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);
/// One read slice of a query; a query waits at most `READ_ATTEMPTS` slices,
/// and stops at the first quiet slice once the engine has sent anything.
const READ_SLICE: Duration = Duration::from_millis(50);
const READ_ATTEMPTS: usize = 20;

// ── process supervisor ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Running,
    /// Spawn failed; the next `poll_exit` reports it as an ended track.
    Failed,
}

enum EngineState {
    Idle,
    Running { child: Child, track: TrackIndex },
    SpawnFailed { track: TrackIndex },
}

/// Arguments for one engine run.
pub fn engine_args(socket_path: &Path, volume: u8, track_path: &Path) -> Vec<String> {
    vec![
        "--no-video".to_string(),
        "--no-terminal".to_string(),
        platform::mpv_socket_arg(socket_path),
        format!("--volume={}", volume),
        "--".to_string(),
        track_path.display().to_string(),
    ]
}

pub struct EngineSupervisor {
    binary: PathBuf,
    socket_path: PathBuf,
    state: EngineState,
}

impl EngineSupervisor {
    pub fn new(binary: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_path: socket_path.into(),
            state: EngineState::Idle,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        match self.state {
            EngineState::Idle => EnginePhase::Idle,
            EngineState::Running { .. } => EnginePhase::Running,
            EngineState::SpawnFailed { .. } => EnginePhase::Failed,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, EngineState::Running { .. })
    }

    #[cfg(test)]
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            EngineState::Running { child, .. } => child.id(),
            _ => None,
        }
    }

    /// Replace whatever runs with a fresh engine playing `track_path`.
    ///
    /// A spawn error is returned for logging, but the supervisor also records
    /// it so the next `poll_exit` reports `track` as finished.
    pub async fn start(
        &mut self,
        track: TrackIndex,
        track_path: &Path,
        volume: u8,
    ) -> anyhow::Result<()> {
        self.stop().await;

        let args = engine_args(&self.socket_path, volume, track_path);
        let spawned = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                info!(
                    "engine: started pid {:?} for {}",
                    child.id(),
                    track_path.display()
                );
                self.state = EngineState::Running { child, track };
                Ok(())
            }
            Err(e) => {
                warn!("engine: cannot spawn {}: {}", self.binary.display(), e);
                self.state = EngineState::SpawnFailed { track };
                Err(anyhow::anyhow!(
                    "failed to spawn {}: {}",
                    self.binary.display(),
                    e
                ))
            }
        }
    }

    /// Terminate the engine and wait for it. Returns whether one was running.
    pub async fn stop(&mut self) -> bool {
        let was_running = match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Running { mut child, .. } => {
                terminate(&mut child).await;
                true
            }
            _ => false,
        };
        self.remove_socket();
        was_running
    }

    /// Non-blocking reap. Yields the finished track exactly once per exit.
    pub fn poll_exit(&mut self) -> Option<TrackIndex> {
        let finished = match &mut self.state {
            EngineState::Idle => return None,
            EngineState::SpawnFailed { track } => *track,
            EngineState::Running { child, track } => match child.try_wait() {
                Ok(None) => return None,
                Ok(Some(status)) => {
                    match status.code() {
                        Some(code) => debug!("engine: exited with code {}", code),
                        None => debug!("engine: terminated by signal"),
                    }
                    *track
                }
                Err(e) => {
                    warn!("engine: wait failed, treating as exit: {}", e);
                    *track
                }
            },
        };
        self.state = EngineState::Idle;
        self.remove_socket();
        Some(finished)
    }

    fn remove_socket(&self) {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!("engine: removed {}", self.socket_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("engine: cannot remove {}: {}", self.socket_path.display(), e),
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("engine: SIGTERM to {} failed: {}", pid, e);
        }
    }
    match timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!("engine: stopped ({})", status),
        Ok(Err(e)) => warn!("engine: wait after SIGTERM failed: {}", e),
        Err(_) => {
            warn!("engine: ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!("engine: kill failed: {}", e);
            }
        }
    }
}

// ── control channel ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot connect to engine socket: {0}")]
    ConnectFailed(#[source] io::Error),
    #[error("engine socket write failed: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("engine socket read failed: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("not connected to engine")]
    NotConnected,
}

pub struct ControlChannel {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    next_request_id: u64,
}

impl ControlChannel {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            stream: None,
            next_request_id: 1,
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// No-op when already connected.
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = match timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(ChannelError::ConnectFailed(e)),
            Err(_) => {
                return Err(ChannelError::ConnectFailed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };
        debug!("channel: connected to {}", self.socket_path.display());
        self.stream = Some(stream);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("channel: disconnected");
        }
    }

    /// Fire and forget. Any failure drops the connection along with the command.
    pub async fn send(&mut self, command: &EngineCommand) -> Result<(), ChannelError> {
        self.connect().await?;
        let line = command.encode(None);
        debug!("channel: -> {}", line.trim_end());
        self.write_all(line.as_bytes()).await
    }

    /// Ask for two properties in one batch and wait a bounded time for both
    /// replies. A reply that does not arrive in time comes back as `None`.
    pub async fn query_pair(
        &mut self,
        first: &str,
        second: &str,
    ) -> Result<(Option<f64>, Option<f64>), ChannelError> {
        self.connect().await?;

        let id_a = self.alloc_request_id();
        let id_b = self.alloc_request_id();
        let mut batch = EngineCommand::get(first).encode(Some(id_a));
        batch.push_str(&EngineCommand::get(second).encode(Some(id_b)));
        self.write_all(batch.as_bytes()).await?;

        let mut replies = ReplyAssembler::new(&[id_a, id_b]);
        let mut buf = [0u8; 4096];
        let mut heard = false;
        for _ in 0..READ_ATTEMPTS {
            let Some(stream) = self.stream.as_mut() else {
                return Err(ChannelError::NotConnected);
            };
            match timeout(READ_SLICE, stream.read(&mut buf)).await {
                Err(_) if heard => break,
                Err(_) => continue,
                Ok(Ok(0)) => {
                    self.disconnect();
                    return Err(ChannelError::ReadFailed(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "engine closed the socket",
                    )));
                }
                Ok(Ok(n)) => {
                    heard = true;
                    replies.feed(&buf[..n]);
                    if replies.is_complete() {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.disconnect();
                    return Err(ChannelError::ReadFailed(e));
                }
            }
        }

        if !replies.is_complete() {
            debug!("channel: query {}/{} timed out, reconnecting next time", id_a, id_b);
            self.disconnect();
        }
        Ok((replies.value(id_a), replies.value(id_b)))
    }

    fn alloc_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ChannelError::NotConnected);
        };
        let result = match timeout(WRITE_TIMEOUT, stream.write_all(bytes)).await {
            Ok(r) => r,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };
        if let Err(e) = result {
            self.disconnect();
            return Err(ChannelError::WriteFailed(e));
        }
        Ok(())
    }
}
