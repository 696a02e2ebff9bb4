//! Candidate pool with exclusion-aware random selection.
//!
//! Streams that failed to bind are parked in a pool-wide failed set until the
//! pool runs dry, at which point the set is forgotten and they become eligible
//! again. Local files rotate through a bounded recently-used window so the
//! same clip doesn't land on several tiles back to back.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Upper bound on the recently-used window for local files
const MAX_RECENT_LOCAL: usize = 20;

/// Stream URLs and local files available to a wall
#[derive(Debug, Clone)]
pub struct ResourcePool {
    streams: Vec<String>,
    locals: Vec<PathBuf>,
    failed_streams: HashSet<String>,
    recent_local: VecDeque<PathBuf>,
    recent_cap: usize,
    rng: StdRng,
}

impl ResourcePool {
    pub fn new(streams: Vec<String>, locals: Vec<PathBuf>) -> Self {
        Self::with_rng(streams, locals, StdRng::from_os_rng())
    }

    /// Create a pool with a deterministic random source
    pub fn with_rng(streams: Vec<String>, locals: Vec<PathBuf>, rng: StdRng) -> Self {
        let recent_cap = (locals.len() / 2).min(MAX_RECENT_LOCAL);
        Self {
            streams,
            locals,
            failed_streams: HashSet::new(),
            recent_local: VecDeque::with_capacity(recent_cap + 1),
            recent_cap,
            rng,
        }
    }

    /// Pick a random stream that is neither excluded nor known to be failing.
    ///
    /// If that leaves nothing but some streams are marked failed, the failed
    /// set is cleared and the pick is attempted once more.
    pub fn pick_stream(&mut self, exclude: &HashSet<String>) -> Option<String> {
        if self.streams.is_empty() {
            return None;
        }

        for attempt in 0..2 {
            let available: Vec<&String> = self
                .streams
                .iter()
                .filter(|url| !exclude.contains(*url) && !self.failed_streams.contains(*url))
                .collect();

            if let Some(url) = available.choose(&mut self.rng) {
                return Some((*url).clone());
            }

            if attempt > 0 || self.failed_streams.is_empty() {
                break;
            }

            log::debug!(
                "All streams excluded, forgetting {} failed stream(s)",
                self.failed_streams.len()
            );
            self.failed_streams.clear();
        }

        None
    }

    /// Pick a random local file, avoiding the recently used window.
    pub fn pick_local(&mut self) -> Option<PathBuf> {
        if self.locals.is_empty() {
            return None;
        }

        let available: Vec<&PathBuf> = self
            .locals
            .iter()
            .filter(|path| !self.recent_local.contains(*path))
            .collect();

        let choice = match available.choose(&mut self.rng) {
            Some(path) => (*path).clone(),
            None => {
                log::debug!("Every local video used recently, resetting rotation");
                self.recent_local.clear();
                self.locals.choose(&mut self.rng)?.clone()
            }
        };

        self.recent_local.push_back(choice.clone());
        while self.recent_local.len() > self.recent_cap {
            self.recent_local.pop_front();
        }

        Some(choice)
    }

    /// Record a stream as broadly bad
    pub fn mark_failed(&mut self, url: &str) {
        if self.failed_streams.insert(url.to_string()) {
            log::debug!("Marked stream as failed: {}", url);
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_streams.len()
    }

    #[cfg(test)]
    pub fn is_failed(&self, url: &str) -> bool {
        self.failed_streams.contains(url)
    }

    #[cfg(test)]
    pub fn recent_local(&self) -> impl Iterator<Item = &Path> {
        self.recent_local.iter().map(|p| p.as_path())
    }

    #[cfg(test)]
    pub fn recent_cap(&self) -> usize {
        self.recent_cap
    }
}
