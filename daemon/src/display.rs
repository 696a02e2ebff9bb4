//! Tile display surface as seen by a playback controller.
//!
//! The controller only signals the display; it never reads back anything but
//! visibility. `TileBoard` is the headless implementation used by the daemon:
//! it keeps the latest status line per tile so the state can be queried over
//! IPC, and mirrors every notification into the log.

use common::StatusLine;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub trait TileDisplay: Send {
    /// Whether the tile is currently shown to anyone
    fn is_visible(&self, slot: usize) -> bool;

    /// Show a status line; `duration` of `None` keeps it until replaced or
    /// cleared
    fn notify(&mut self, slot: usize, message: &str, is_error: bool, duration: Option<Duration>);

    /// Drop the tile's status line if it is an error
    fn clear_error(&mut self, slot: usize);

    /// Status line currently shown on the tile
    fn status(&self, slot: usize) -> Option<StatusLine>;

    fn window_visible(&self) -> bool;

    fn set_window_visible(&mut self, visible: bool);
}

#[derive(Debug, Clone)]
struct Notice {
    message: String,
    is_error: bool,
    expires_at: Option<Instant>,
}

impl Notice {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Status lines for one screen's tiles
#[derive(Debug)]
pub struct TileBoard {
    screen: String,
    visible: bool,
    notices: HashMap<usize, Notice>,
}

impl TileBoard {
    pub fn new(screen: impl Into<String>) -> Self {
        Self {
            screen: screen.into(),
            visible: true,
            notices: HashMap::new(),
        }
    }
}

impl TileDisplay for TileBoard {
    fn is_visible(&self, _slot: usize) -> bool {
        // Tiles have no geometry of their own; they follow the window
        self.visible
    }

    fn notify(&mut self, slot: usize, message: &str, is_error: bool, duration: Option<Duration>) {
        if is_error {
            log::warn!("[{}:{}] {}", self.screen, slot, message);
        } else {
            log::info!("[{}:{}] {}", self.screen, slot, message);
        }

        let now = Instant::now();
        self.notices.retain(|_, n| n.is_live(now));
        self.notices.insert(
            slot,
            Notice {
                message: message.to_string(),
                is_error,
                expires_at: duration.map(|d| now + d),
            },
        );
    }

    fn clear_error(&mut self, slot: usize) {
        if self.notices.get(&slot).is_some_and(|n| n.is_error) {
            self.notices.remove(&slot);
        }
    }

    fn status(&self, slot: usize) -> Option<StatusLine> {
        let now = Instant::now();
        let notice = self.notices.get(&slot).filter(|n| n.is_live(now))?;

        Some(StatusLine {
            message: notice.message.clone(),
            is_error: notice.is_error,
            remaining_ms: notice
                .expires_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
        })
    }

    fn window_visible(&self) -> bool {
        self.visible
    }

    fn set_window_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}
