//! Candidate media collection.
//!
//! Produces the two feeds the playback controllers draw from: stream URLs
//! read from a playlist file and local video files found by scanning
//! directories. Both are treated as opaque identifiers from here on.

use anyhow::{Context, Result};
use glob::glob;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::config::SourceSettings;

/// Both candidate feeds, ready to seed a resource pool
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub streams: Vec<String>,
    pub locals: Vec<PathBuf>,
}

impl Candidates {
    /// Collect candidates as configured
    pub fn collect(settings: &SourceSettings) -> Result<Self> {
        let streams = match settings.playlist {
            Some(ref playlist) => {
                let path = PathBuf::from(shellexpand::tilde(playlist).as_ref());
                if path.exists() {
                    load_stream_list(&path)?
                } else {
                    log::warn!("Playlist not found: {}", path.display());
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        let locals = if settings.use_local_videos {
            scan_local_videos(&settings.local_dirs, &settings.extensions)
        } else {
            Vec::new()
        };

        log::info!(
            "Collected {} stream(s) and {} local video(s)",
            streams.len(),
            locals.len()
        );

        Ok(Self { streams, locals })
    }
}

/// Read stream URLs from a playlist file.
pub fn load_stream_list(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist: {}", path.display()))?;

    Ok(parse_stream_list(&contents))
}

/// Extract stream URLs from playlist text.
///
/// Blank lines and `#` directives are skipped, protocol-less entries get
/// `https://`, anything that still isn't an absolute URL is dropped.
pub fn parse_stream_list(contents: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut streams = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(url) = normalize_stream_url(line) else {
            log::warn!("Skipping invalid stream entry: {}", line);
            continue;
        };

        if seen.insert(url.clone()) {
            streams.push(url);
        }
    }

    streams
}

fn normalize_stream_url(entry: &str) -> Option<String> {
    let candidate = if entry.contains("://") {
        entry.to_string()
    } else if let Some(rest) = entry.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", entry)
    };

    let url = Url::parse(&candidate).ok()?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return None;
    }

    Some(url.to_string())
}

/// Recursively find video files under the given directories.
pub fn scan_local_videos(dirs: &[String], extensions: &[String]) -> Vec<PathBuf> {
    let mut videos = Vec::new();

    for dir in dirs {
        let expanded = shellexpand::tilde(dir);
        let root = Path::new(expanded.as_ref());

        if !root.is_dir() {
            log::warn!("Local video directory not found: {}", root.display());
            continue;
        }

        let pattern = format!("{}/**/*", glob::Pattern::escape(expanded.as_ref()));
        match glob(&pattern) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.is_file()
                        && has_valid_extension(&entry, extensions)
                        && !is_hidden(entry.strip_prefix(root).unwrap_or(&entry))
                    {
                        videos.push(entry);
                    }
                }
            }
            Err(e) => {
                log::warn!("Failed to scan '{}': {}", dir, e);
            }
        }
    }

    // Remove duplicates
    videos.sort();
    videos.dedup();

    videos
}

/// Check if a file has a valid extension
fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Hidden files, or anything inside a hidden directory
fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    })
}
