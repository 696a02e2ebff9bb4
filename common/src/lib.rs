//! Common types and utilities for vidwall.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`vidwall`) and client (`vwctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages, one per line. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::Command;
//!
//! // Reassign content on every screen
//! let cmd = Command::Reassign { screen: None };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum WallError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for WallError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for WallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
///
/// Every command that takes a `screen` applies to all screens when it is
/// `None`.
///
/// # Examples
///
/// ```
/// use common::Command;
///
/// // Hide the wall on one monitor (pauses its players)
/// let cmd = Command::SetVisibility {
///     screen: Some("HDMI-1".to_string()),
///     visible: false,
/// };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Run a fresh assignment pass, rotating content on every tile.
    Reassign { screen: Option<String> },
    /// Pause every playing tile.
    PauseAll { screen: Option<String> },
    /// Resume playback on visible tiles.
    ResumeVisible { screen: Option<String> },
    /// Window visibility changed: hidden walls pause, shown walls resume.
    SetVisibility {
        screen: Option<String>,
        visible: bool,
    },
    /// Query daemon status
    Query,
    /// Kill the daemon
    Kill,
    /// Ping the daemon
    Ping,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(WallError),
    Status(DaemonStatus),
    Pong,
}

/// Daemon status information
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub screens: Vec<ScreenStatus>,
}

/// Status of one video wall (one monitor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenStatus {
    pub name: String,
    pub visible: bool,
    pub stream_candidates: usize,
    pub local_candidates: usize,
    pub failed_streams: usize,
    pub slots: Vec<SlotStatus>,
}

impl ScreenStatus {
    /// Number of slots currently in stream mode
    pub fn streaming_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.mode == SlotMode::Stream)
            .count()
    }
}

/// Status of a single tile's player slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatus {
    pub index: usize,
    pub mode: SlotMode,
    pub phase: SlotPhase,
    pub source: Option<String>,
    pub retry_count: u32,
    pub tried_sources: usize,
    pub playing: bool,
    pub status: Option<StatusLine>,
}

/// Which content pool a slot draws from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotMode {
    /// Network stream from the playlist
    #[default]
    Stream,
    /// Local video file
    Local,
}

impl SlotMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Local => "local",
        }
    }
}

/// Lifecycle phase of a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotPhase {
    /// Nothing bound yet
    #[default]
    Unassigned,
    /// Stream bound, waiting for the engine to report it loaded
    Loading,
    /// Stream loaded and playing
    Playing,
    /// Failure recorded, retry pending
    Retrying,
    /// Playing a local file
    LocalPlaying,
    /// No stream or local candidate available
    Exhausted,
}

impl SlotPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Retrying => "retrying",
            Self::LocalPlaying => "local",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Status overlay text currently shown on a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub message: String,
    pub is_error: bool,
    /// Milliseconds until the message hides, None if it persists
    pub remaining_ms: Option<u64>,
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("vidwall.sock")
}
