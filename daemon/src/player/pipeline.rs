//! GStreamer `playbin` backend
//!
//! One muted playbin per tile. Bus messages are translated on the streaming
//! thread and posted straight into the controller inbox.

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use super::{BindError, EventSender, MediaSource, Player, PlayerEvent, PlayerEventKind};
use crate::config::PlayerSettings;
use crate::controller::ControllerMessage;

/// Decoders promoted above their software counterparts when hardware
/// decoding is enabled
const HARDWARE_DECODERS: &[&str] = &[
    "vah264dec",
    "vah265dec",
    "vavp9dec",
    "vaav1dec",
    "nvh264dec",
    "nvh265dec",
    "vtdec_hw",
    "d3d11h264dec",
];

/// Initialize GStreamer (idempotent, safe to call multiple times)
fn initialize_gstreamer(hardware_decode: bool) -> Result<()> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");

            if hardware_decode {
                prefer_hardware_decoders();
            }
            Ok(())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("Failed to initialize GStreamer: {}", e))
}

fn prefer_hardware_decoders() {
    let registry = gst::Registry::get();
    for name in HARDWARE_DECODERS {
        if let Some(feature) = registry.lookup_feature(name) {
            feature.set_rank(gst::Rank::PRIMARY + 1);
            log::debug!("Preferring hardware decoder: {}", name);
        }
    }
}

pub struct GstPlayer {
    slot: usize,
    playbin: gst::Element,
    /// Generation of the source currently attached, shared with the bus handler
    generation: Arc<AtomicU64>,
    playing: bool,
}

impl GstPlayer {
    pub fn new(slot: usize, settings: &PlayerSettings, events: EventSender) -> Result<Self> {
        initialize_gstreamer(settings.hardware_decode)?;

        let name = format!("tile-{}", slot);
        let playbin = gst::ElementFactory::make("playbin")
            .name(name.as_str())
            .property("mute", true)
            .property("volume", 0.0f64)
            .property("buffer-size", settings.buffer_size)
            .property(
                "buffer-duration",
                settings.network_caching_ms as i64 * 1_000_000,
            )
            .build()
            .context("Failed to create playbin (is gst-plugins-base installed?)")?;

        let sink = gst::ElementFactory::make(&settings.video_sink)
            .name(format!("{}-sink", name))
            .build()
            .with_context(|| format!("Failed to create video sink '{}'", settings.video_sink))?;
        playbin.set_property("video-sink", &sink);

        let generation = Arc::new(AtomicU64::new(0));
        let bus = playbin.bus().context("playbin has no bus")?;
        install_bus_handler(&bus, slot, name, generation.clone(), events);

        log::debug!("Created player for tile {}", slot);

        Ok(Self {
            slot,
            playbin,
            generation,
            playing: false,
        })
    }
}

/// Post translated bus messages into the controller inbox
fn install_bus_handler(
    bus: &gst::Bus,
    slot: usize,
    playbin_name: String,
    generation: Arc<AtomicU64>,
    events: EventSender,
) {
    bus.set_sync_handler(move |_bus, msg| {
        if let Some(kind) = event_kind(slot, &playbin_name, msg) {
            let event = PlayerEvent {
                slot,
                generation: generation.load(Ordering::Acquire),
                kind,
            };
            // Controller gone means we're shutting down
            let _ = events.send(ControllerMessage::Player(event));
        }

        gst::BusSyncReply::Drop
    });
}

/// Map a bus message to the event it stands for, if any.
///
/// Only the playbin's own Ready to Paused transition counts as loaded; child
/// elements report state changes on the same bus.
fn event_kind(slot: usize, playbin_name: &str, msg: &gst::MessageRef) -> Option<PlayerEventKind> {
    use gst::MessageView;

    match msg.view() {
        MessageView::Eos(_) => Some(PlayerEventKind::MediaEnded),
        MessageView::Error(err) => {
            let error = err.error();
            log::debug!(
                "Tile {} GStreamer error: {} (debug: {:?})",
                slot,
                error,
                err.debug()
            );
            if is_undecodable(&error) {
                Some(PlayerEventKind::MediaInvalid)
            } else {
                Some(PlayerEventKind::Error(error.to_string()))
            }
        }
        MessageView::StateChanged(changed)
            if changed.old() == gst::State::Ready
                && changed.current() == gst::State::Paused
                && msg.src().is_some_and(|s| s.name().as_str() == playbin_name) =>
        {
            Some(PlayerEventKind::MediaLoaded)
        }
        _ => None,
    }
}

fn is_undecodable(error: &gst::glib::Error) -> bool {
    matches!(
        error.kind::<gst::StreamError>(),
        Some(
            gst::StreamError::TypeNotFound
                | gst::StreamError::WrongType
                | gst::StreamError::CodecNotFound
                | gst::StreamError::Decode
                | gst::StreamError::Demux
                | gst::StreamError::Format
        )
    )
}

impl Player for GstPlayer {
    fn bind(&mut self, source: &MediaSource, generation: u64) -> Result<(), BindError> {
        let uri = source.to_uri()?;

        self.playbin
            .set_state(gst::State::Ready)
            .map_err(|e| BindError::Backend(e.to_string()))?;
        self.playing = false;

        // Messages from the previous source now carry a stale generation
        self.generation.store(generation, Ordering::Release);
        self.playbin.set_property("uri", &uri);

        log::debug!("Tile {} bound to {}", self.slot, uri);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.playbin
            .set_state(gst::State::Playing)
            .with_context(|| format!("Failed to start tile {}", self.slot))?;
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playbin
            .set_state(gst::State::Paused)
            .with_context(|| format!("Failed to pause tile {}", self.slot))?;
        self.playing = false;
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.playbin
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::ZERO,
            )
            .with_context(|| format!("Failed to rewind tile {}", self.slot))?;
        self.play()
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn release(&mut self) {
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::warn!("Failed to stop tile {}: {}", self.slot, e);
        }
        self.playing = false;
    }
}

impl Drop for GstPlayer {
    fn drop(&mut self) {
        if let Some(bus) = self.playbin.bus() {
            bus.unset_sync_handler();
        }
        let _ = self.playbin.set_state(gst::State::Null);
        log::debug!("Tile {} player dropped", self.slot);
    }
}
