//! Playback lifecycle for one video wall.
//!
//! A [`PlaybackController`] owns every tile's [`PlayerSlot`] and the wall's
//! [`ResourcePool`]. It assigns sources, reacts to player events and drives
//! retries and fallback to local files. All mutation goes through `&mut self`;
//! the [`actor`] module serializes callers onto a single task.

mod actor;
#[cfg(test)]
mod tests;

pub use actor::{ControllerMessage, WallHandle, spawn};

use common::{ScreenStatus, SlotMode, SlotPhase, SlotStatus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Duration;

use crate::config::WallSettings;
use crate::display::TileDisplay;
use crate::log_and_continue;
use crate::player::{BindError, MediaSource, Player, PlayerEvent, PlayerEventKind, PlayerSlot};
use crate::pool::ResourcePool;

/// A debounced retry the caller should deliver back through
/// [`PlaybackController::on_retry_due`] after `delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    pub slot: usize,
    pub generation: u64,
    pub delay: Duration,
}

pub struct PlaybackController {
    screen: String,
    pool: ResourcePool,
    slots: Vec<PlayerSlot>,
    display: Box<dyn TileDisplay>,
    settings: WallSettings,
    rng: StdRng,
}

impl PlaybackController {
    /// Create a controller with one slot per player, in tile order
    pub fn new(
        screen: impl Into<String>,
        pool: ResourcePool,
        players: Vec<Box<dyn Player>>,
        display: Box<dyn TileDisplay>,
        settings: WallSettings,
    ) -> Self {
        Self::with_rng(
            screen,
            pool,
            players,
            display,
            settings,
            StdRng::from_os_rng(),
        )
    }

    pub fn with_rng(
        screen: impl Into<String>,
        pool: ResourcePool,
        players: Vec<Box<dyn Player>>,
        display: Box<dyn TileDisplay>,
        settings: WallSettings,
        rng: StdRng,
    ) -> Self {
        let slots = players
            .into_iter()
            .enumerate()
            .map(|(index, player)| PlayerSlot::new(index, player))
            .collect();

        Self {
            screen: screen.into(),
            pool,
            slots,
            display,
            settings,
            rng,
        }
    }

    /// Assign content to every tile.
    ///
    /// Up to `max_active_players` stream-mode slots get a fresh stream, every
    /// other slot is handed a local file.
    pub fn assign_content(&mut self) {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.shuffle(&mut self.rng);

        let (stream_slots, local_slots): (Vec<usize>, Vec<usize>) = order
            .into_iter()
            .partition(|&idx| self.slots[idx].mode() == SlotMode::Stream);

        let max_streams = stream_slots
            .len()
            .min(self.settings.max_active_players)
            .min(self.pool.stream_count());

        log::info!(
            "[{}] Assigning content: {} stream slot(s), {} local slot(s), {} stream(s) allowed",
            self.screen,
            stream_slots.len(),
            local_slots.len(),
            max_streams
        );

        for &idx in &stream_slots[..max_streams] {
            let exclude = self.slots[idx].tried_streams();
            let Some(url) = self.pool.pick_stream(&exclude) else {
                self.fallback_to_local(idx);
                continue;
            };

            match self.bind_stream(idx, url) {
                Ok(()) => self.slots[idx].reset_retries(),
                Err(_) => self.fallback_to_local(idx),
            }
        }

        for &idx in stream_slots[max_streams..].iter().chain(&local_slots) {
            self.fallback_to_local(idx);
        }
    }

    /// Bind a stream and show the loading status.
    ///
    /// On failure the stream is recorded as tried on this tile and marked
    /// failed in the pool.
    fn bind_stream(&mut self, idx: usize, url: String) -> Result<(), BindError> {
        let source = MediaSource::Stream(url);
        let slot = &mut self.slots[idx];

        match slot.bind(source.clone()) {
            Ok(bound) => {
                log::debug!(
                    "[{}] Tile {} loading {} (generation {})",
                    self.screen,
                    idx,
                    source,
                    bound.generation
                );
                slot.set_phase(SlotPhase::Loading);
                self.display.notify(
                    idx,
                    "Loading stream...",
                    false,
                    Some(Duration::from_millis(self.settings.loading_status_ms)),
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("[{}] Tile {} failed to bind {}: {}", self.screen, idx, source, e);
                if let Some(url) = source.as_stream() {
                    self.pool.mark_failed(url);
                }
                slot.record_tried(source);
                Err(e)
            }
        }
    }

    /// Put a local file on the tile, or report that there is nothing to show
    pub fn fallback_to_local(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        slot.reset_retries();

        let Some(path) = self.pool.pick_local() else {
            log::warn!("[{}] Tile {}: no media available", self.screen, idx);
            slot.set_phase(SlotPhase::Exhausted);
            if self.display.is_visible(idx) {
                self.display.notify(idx, "No media available", true, None);
            }
            return;
        };

        let source = MediaSource::Local(path);
        match slot.bind(source.clone()) {
            Ok(_) => {
                log::debug!("[{}] Tile {} playing local {}", self.screen, idx, source);
                slot.set_phase(SlotPhase::LocalPlaying);
                self.display.notify(
                    idx,
                    &source.display_name(),
                    false,
                    Some(Duration::from_millis(self.settings.local_status_ms)),
                );
            }
            Err(e) => {
                log::error!("[{}] Tile {} failed to load {}: {}", self.screen, idx, source, e);
                slot.record_tried(source);
                if slot.current().is_some() && slot.phase() != SlotPhase::Retrying {
                    // The previous source is still attached and playing
                    self.display.notify(
                        idx,
                        "Failed to load video",
                        true,
                        Some(Duration::from_millis(self.settings.error_status_ms)),
                    );
                } else {
                    slot.set_phase(SlotPhase::Exhausted);
                    self.display.notify(idx, "Failed to load video", true, None);
                }
            }
        }
    }

    /// Replace the tile's stream after a failure.
    ///
    /// Each failed bind counts as a retry, so this gives up and falls back to
    /// local after at most `max_retries` attempts.
    fn retry_slot(&mut self, idx: usize) {
        loop {
            let retries = self.slots[idx].retry_count();
            if retries >= self.settings.max_retries {
                log::info!(
                    "[{}] Tile {} failed {} time(s), falling back to local",
                    self.screen,
                    idx,
                    retries
                );
                self.fallback_to_local(idx);
                return;
            }

            let exclude = self.slots[idx].stream_exclusions();
            let Some(url) = self.pool.pick_stream(&exclude) else {
                log::info!("[{}] Tile {}: no untried streams left", self.screen, idx);
                self.fallback_to_local(idx);
                return;
            };

            if self.bind_stream(idx, url).is_ok() {
                self.display.notify(
                    idx,
                    &format!("Retrying stream ({}/{})", retries + 1, self.settings.max_retries),
                    false,
                    Some(Duration::from_millis(self.settings.retry_status_ms)),
                );
                return;
            }

            self.slots[idx].record_failure();
        }
    }

    /// React to an event from a tile's player.
    ///
    /// Returns the retry to schedule when the event asks for a debounced one.
    pub fn handle_player_event(&mut self, event: PlayerEvent) -> Option<ScheduledRetry> {
        let idx = event.slot;
        let Some(slot) = self.slots.get_mut(idx) else {
            log::warn!("[{}] Event for unknown tile {}", self.screen, idx);
            return None;
        };

        if event.generation != slot.generation() {
            log::debug!(
                "[{}] Dropping stale {:?} for tile {} (generation {} != {})",
                self.screen,
                event.kind,
                idx,
                event.generation,
                slot.generation()
            );
            return None;
        }

        match event.kind {
            PlayerEventKind::Error(message) => {
                if slot.phase() == SlotPhase::Retrying {
                    log::debug!("[{}] Tile {} already retrying", self.screen, idx);
                    return None;
                }

                log::warn!("[{}] Tile {} player error: {}", self.screen, idx, message);
                if let Some(current) = slot.current().cloned() {
                    slot.record_tried(current);
                }
                slot.record_failure();
                slot.set_phase(SlotPhase::Retrying);

                self.display.notify(
                    idx,
                    &format!("Player error: {}", message),
                    true,
                    Some(Duration::from_millis(self.settings.error_status_ms)),
                );

                return Some(ScheduledRetry {
                    slot: idx,
                    generation: slot.generation(),
                    delay: self.settings.retry_delay(),
                });
            }

            PlayerEventKind::MediaEnded => {
                log::debug!("[{}] Tile {} reached end, looping", self.screen, idx);
                log_and_continue!(slot.restart(), "restart tile");
            }

            PlayerEventKind::MediaLoaded => {
                if slot.mode() == SlotMode::Stream {
                    self.display.clear_error(idx);
                    slot.set_phase(SlotPhase::Playing);
                    slot.reset_retries();
                }
            }

            PlayerEventKind::MediaInvalid => {
                log::warn!("[{}] Tile {} media is invalid", self.screen, idx);
                if let Some(current) = slot.current().cloned() {
                    slot.record_tried(current);
                }
                slot.record_failure();
                slot.set_phase(SlotPhase::Retrying);
                self.retry_slot(idx);
            }
        }

        None
    }

    /// Run a retry scheduled by [`handle_player_event`](Self::handle_player_event)
    pub fn on_retry_due(&mut self, idx: usize, generation: u64) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };

        if slot.generation() != generation || slot.phase() != SlotPhase::Retrying {
            log::debug!("[{}] Skipping superseded retry for tile {}", self.screen, idx);
            return;
        }

        self.retry_slot(idx);
    }

    pub fn pause_all(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.is_playing()) {
            log_and_continue!(slot.pause(), "pause tile");
        }
    }

    /// Resume every visible tile that has something bound
    pub fn resume_visible(&mut self) {
        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            if slot.current().is_none()
                || slot.phase() == SlotPhase::Exhausted
                || slot.is_playing()
                || !self.display.is_visible(idx)
            {
                continue;
            }
            log_and_continue!(slot.play(), "resume tile");
        }
    }

    /// Window shown or hidden
    pub fn set_visible(&mut self, visible: bool) {
        log::info!(
            "[{}] Window {}",
            self.screen,
            if visible { "shown" } else { "hidden" }
        );
        self.display.set_window_visible(visible);
        if visible {
            self.resume_visible();
        } else {
            self.pause_all();
        }
    }

    pub fn snapshot(&self) -> ScreenStatus {
        ScreenStatus {
            name: self.screen.clone(),
            visible: self.display.window_visible(),
            stream_candidates: self.pool.stream_count(),
            local_candidates: self.pool.local_count(),
            failed_streams: self.pool.failed_count(),
            slots: self
                .slots
                .iter()
                .map(|slot| SlotStatus {
                    index: slot.index(),
                    mode: slot.mode(),
                    phase: slot.phase(),
                    source: slot.current().map(|s| s.to_string()),
                    retry_count: slot.retry_count(),
                    tried_sources: slot.tried_count(),
                    playing: slot.is_playing(),
                    status: self.display.status(slot.index()),
                })
                .collect(),
        }
    }

    /// Stop and release every player
    pub fn shutdown(&mut self) {
        log::info!("[{}] Stopping {} tile(s)", self.screen, self.slots.len());
        for slot in &mut self.slots {
            if slot.is_playing() {
                log_and_continue!(slot.pause(), "pause tile");
            }
            slot.release();
        }
    }

    pub fn screen(&self) -> &str {
        &self.screen
    }

    #[cfg(test)]
    fn slot(&self, idx: usize) -> &PlayerSlot {
        &self.slots[idx]
    }

    #[cfg(test)]
    fn pool(&self) -> &ResourcePool {
        &self.pool
    }
}
