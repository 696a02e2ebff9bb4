//! Per-tile playback units.
//!
//! Each tile owns one [`Player`] backend wrapped in a [`PlayerSlot`]. Backends
//! report asynchronous [`PlayerEvent`]s into the owning controller's inbox;
//! every event carries the bind generation it was produced under so the
//! controller can drop events for sources it has already replaced.
//!
//! - `slot`: per-tile retry/exclusion state around a backend
//! - `pipeline`: GStreamer `playbin` backend (requires the `video` feature)

#[cfg(feature = "video")]
mod pipeline;
mod slot;
#[cfg(test)]
pub mod testing;

pub use slot::PlayerSlot;

use anyhow::Result;
use common::SlotMode;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::config::PlayerSettings;
use crate::controller::ControllerMessage;

/// Channel a backend posts its events on
pub type EventSender = tokio::sync::mpsc::UnboundedSender<ControllerMessage>;

/// Something a tile can play
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaSource {
    Stream(String),
    Local(PathBuf),
}

impl MediaSource {
    pub fn mode(&self) -> SlotMode {
        match self {
            Self::Stream(_) => SlotMode::Stream,
            Self::Local(_) => SlotMode::Local,
        }
    }

    /// Short human-readable name for status overlays
    pub fn display_name(&self) -> String {
        match self {
            Self::Stream(url) => url.clone(),
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    pub fn as_stream(&self) -> Option<&str> {
        match self {
            Self::Stream(url) => Some(url),
            Self::Local(_) => None,
        }
    }

    /// Resolve to a URI a playback engine can open.
    ///
    /// Fails if the URL is malformed or the file is not readable right now.
    pub fn to_uri(&self) -> Result<String, BindError> {
        match self {
            Self::Stream(url) => {
                let parsed = Url::parse(url).map_err(|e| BindError::InvalidUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                Ok(parsed.to_string())
            }
            Self::Local(path) => local_uri(path),
        }
    }
}

fn local_uri(path: &Path) -> Result<String, BindError> {
    let absolute = path
        .canonicalize()
        .map_err(|_| BindError::MissingFile(path.to_path_buf()))?;

    if !absolute.is_file() {
        return Err(BindError::MissingFile(path.to_path_buf()));
    }

    Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|_| BindError::MissingFile(path.to_path_buf()))
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(url) => write!(f, "{}", url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Failure to attach a source, detected before any playback starts
#[derive(Error, Debug)]
pub enum BindError {
    #[error("invalid stream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("file not readable: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("player rejected source: {0}")]
    Backend(String),
}

/// Asynchronous notification from a playback engine
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    pub slot: usize,
    pub generation: u64,
    pub kind: PlayerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEventKind {
    /// Playback failed after a successful bind
    Error(String),
    /// Reached the end of the media
    MediaEnded,
    /// Media is loaded and prerolled
    MediaLoaded,
    /// Content can't be decoded
    MediaInvalid,
}

/// One playback engine instance bound to a tile.
///
/// `bind` and `play` only issue requests and the engine reports the outcome
/// later through its [`EventSender`]. Tearing down the previous source may
/// still wait on streaming threads, so callers run on a blocking thread.
pub trait Player: Send {
    /// Attach `source`, tagging all later events with `generation`.
    ///
    /// On error the previously attached source and generation stay in effect.
    fn bind(&mut self, source: &MediaSource, generation: u64) -> Result<(), BindError>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Seek back to the start and resume
    fn restart(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;

    /// Stop playback and free engine resources
    fn release(&mut self) {}
}

/// Create the playback engine for one tile
#[cfg(feature = "video")]
pub fn create_backend(
    slot: usize,
    settings: &PlayerSettings,
    events: EventSender,
) -> Result<Box<dyn Player>> {
    Ok(Box::new(pipeline::GstPlayer::new(slot, settings, events)?))
}

#[cfg(not(feature = "video"))]
pub fn create_backend(
    _slot: usize,
    _settings: &PlayerSettings,
    _events: EventSender,
) -> Result<Box<dyn Player>> {
    anyhow::bail!("Video support not compiled in. Build with --features video")
}
