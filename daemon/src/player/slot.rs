use anyhow::Result;
use common::{SlotMode, SlotPhase};
use std::collections::HashSet;

use super::{BindError, MediaSource, Player};

/// Returned by a successful bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub generation: u64,
}

/// One tile's playback unit and its retry bookkeeping.
///
/// Only the owning controller mutates a slot.
pub struct PlayerSlot {
    index: usize,
    mode: SlotMode,
    phase: SlotPhase,
    current: Option<MediaSource>,
    /// Sources that failed on this tile; never cleared automatically
    tried: HashSet<MediaSource>,
    /// Consecutive failed attempts since the last success
    retry_count: u32,
    /// Bumped on every accepted bind so late events from older sources can be told apart
    generation: u64,
    player: Box<dyn Player>,
}

impl PlayerSlot {
    pub fn new(index: usize, player: Box<dyn Player>) -> Self {
        Self {
            index,
            mode: SlotMode::Stream,
            phase: SlotPhase::Unassigned,
            current: None,
            tried: HashSet::new(),
            retry_count: 0,
            generation: 0,
            player,
        }
    }

    /// Attach `source` and start playing it.
    ///
    /// The generation only advances once the player has taken the source, so
    /// a rejected bind leaves the previous source and its events current.
    pub fn bind(&mut self, source: MediaSource) -> Result<Bound, BindError> {
        let generation = self.generation + 1;
        self.player.bind(&source, generation)?;

        self.generation = generation;
        self.mode = source.mode();
        self.current = Some(source);

        self.player
            .play()
            .map_err(|e| BindError::Backend(e.to_string()))?;

        Ok(Bound { generation })
    }

    pub fn play(&mut self) -> Result<()> {
        self.player.play()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.player.pause()
    }

    pub fn restart(&mut self) -> Result<()> {
        self.player.restart()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn release(&mut self) {
        self.player.release();
    }

    /// Remember a source that failed on this tile
    pub fn record_tried(&mut self, source: MediaSource) {
        self.tried.insert(source);
    }

    /// Streams to skip when picking a replacement: everything tried plus the
    /// current source
    pub fn stream_exclusions(&self) -> HashSet<String> {
        self.tried
            .iter()
            .chain(self.current.iter())
            .filter_map(|s| s.as_stream().map(str::to_string))
            .collect()
    }

    /// Streams that already failed on this tile
    pub fn tried_streams(&self) -> HashSet<String> {
        self.tried
            .iter()
            .filter_map(|s| s.as_stream().map(str::to_string))
            .collect()
    }

    pub fn record_failure(&mut self) {
        self.retry_count += 1;
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    pub fn set_phase(&mut self, phase: SlotPhase) {
        self.phase = phase;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn mode(&self) -> SlotMode {
        self.mode
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub fn current(&self) -> Option<&MediaSource> {
        self.current.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
