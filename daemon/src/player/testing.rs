//! Scriptable in-memory player for controller and slot tests

use anyhow::Result;
use std::sync::{Arc, Mutex};

use super::{BindError, MediaSource, Player};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Bind(usize, MediaSource),
    Play(usize),
    Pause(usize),
    Restart(usize),
    Release(usize),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Which binds a mock refuses
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub reject: Vec<MediaSource>,
    pub reject_streams: bool,
    pub reject_locals: bool,
    /// Reject stream binds once this many have succeeded
    pub stream_binds_allowed: Option<usize>,
}

impl MockBehavior {
    fn rejects(&self, source: &MediaSource) -> bool {
        match source {
            MediaSource::Stream(_) if self.reject_streams => true,
            MediaSource::Local(_) if self.reject_locals => true,
            _ => self.reject.contains(source),
        }
    }
}

pub struct MockPlayer {
    slot: usize,
    behavior: MockBehavior,
    log: CallLog,
    playing: bool,
    stream_binds: usize,
}

impl MockPlayer {
    pub fn new(behavior: MockBehavior) -> (Self, CallLog) {
        let log = CallLog::default();
        (Self::with_log(0, behavior, log.clone()), log)
    }

    pub fn with_log(slot: usize, behavior: MockBehavior, log: CallLog) -> Self {
        Self {
            slot,
            behavior,
            log,
            playing: false,
            stream_binds: 0,
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

impl Player for MockPlayer {
    fn bind(&mut self, source: &MediaSource, _generation: u64) -> Result<(), BindError> {
        self.record(Call::Bind(self.slot, source.clone()));
        let over_limit = source.as_stream().is_some()
            && self
                .behavior
                .stream_binds_allowed
                .is_some_and(|allowed| self.stream_binds >= allowed);
        if over_limit || self.behavior.rejects(source) {
            return Err(BindError::Backend(format!("rejected {}", source)));
        }
        if source.as_stream().is_some() {
            self.stream_binds += 1;
        }
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.record(Call::Play(self.slot));
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record(Call::Pause(self.slot));
        self.playing = false;
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.record(Call::Restart(self.slot));
        self.playing = true;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn release(&mut self) {
        self.record(Call::Release(self.slot));
        self.playing = false;
    }
}

/// Binds recorded for `slot`, oldest first
pub fn binds_for(log: &CallLog, slot: usize) -> Vec<MediaSource> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            Call::Bind(s, source) if *s == slot => Some(source.clone()),
            _ => None,
        })
        .collect()
}
