use super::*;
use crate::display::TileBoard;
use crate::player::testing::{Call, CallLog, MockBehavior, MockPlayer, binds_for};
use std::path::PathBuf;
use tokio::sync::mpsc;

fn settings(max_active_players: usize) -> WallSettings {
    WallSettings {
        max_active_players,
        ..Default::default()
    }
}

fn build(
    streams: &[&str],
    locals: &[&str],
    tiles: usize,
    settings: WallSettings,
    behavior: MockBehavior,
) -> (PlaybackController, CallLog) {
    let log = CallLog::default();
    let players: Vec<Box<dyn Player>> = (0..tiles)
        .map(|slot| {
            Box::new(MockPlayer::with_log(slot, behavior.clone(), log.clone())) as Box<dyn Player>
        })
        .collect();

    let pool = ResourcePool::with_rng(
        streams.iter().map(|s| s.to_string()).collect(),
        locals.iter().map(PathBuf::from).collect(),
        StdRng::seed_from_u64(11),
    );

    let controller = PlaybackController::with_rng(
        "test",
        pool,
        players,
        Box::new(TileBoard::new("test")),
        settings,
        StdRng::seed_from_u64(3),
    );

    (controller, log)
}

fn event(controller: &PlaybackController, slot: usize, kind: PlayerEventKind) -> PlayerEvent {
    PlayerEvent {
        slot,
        generation: controller.slot(slot).generation(),
        kind,
    }
}

fn stream(url: &str) -> MediaSource {
    MediaSource::Stream(url.to_string())
}

fn local(path: &str) -> MediaSource {
    MediaSource::Local(PathBuf::from(path))
}

/// Fail the slot's current source and run the retry that gets scheduled
fn fail_and_retry(controller: &mut PlaybackController, slot: usize) {
    let ev = event(controller, slot, PlayerEventKind::Error("boom".to_string()));
    let retry = controller
        .handle_player_event(ev)
        .expect("error should schedule a retry");
    assert_eq!(retry.delay, Duration::from_millis(500));
    controller.on_retry_due(retry.slot, retry.generation);
}

#[test]
fn test_assignment_respects_max_active_players() {
    let (mut controller, _log) = build(
        &["A", "B"],
        &["/v/x.mp4", "/v/y.mp4", "/v/z.mp4"],
        2,
        settings(1),
        MockBehavior::default(),
    );
    controller.assign_content();

    let status = controller.snapshot();
    assert_eq!(status.streaming_slots(), 1);

    let streaming = status
        .slots
        .iter()
        .find(|s| s.mode == SlotMode::Stream)
        .unwrap();
    assert!(matches!(streaming.source.as_deref(), Some("A") | Some("B")));
    assert_eq!(streaming.phase, SlotPhase::Loading);
    assert_eq!(
        streaming.status.as_ref().map(|s| s.message.as_str()),
        Some("Loading stream...")
    );

    let local = status
        .slots
        .iter()
        .find(|s| s.mode == SlotMode::Local)
        .unwrap();
    assert!(matches!(
        local.source.as_deref(),
        Some("/v/x.mp4") | Some("/v/y.mp4") | Some("/v/z.mp4")
    ));
    assert_eq!(local.phase, SlotPhase::LocalPlaying);
    assert!(status.slots.iter().all(|s| s.playing));
}

#[test]
fn test_no_active_players_means_all_local() {
    let (mut controller, log) = build(
        &["A", "B"],
        &["/v/x.mp4", "/v/y.mp4"],
        3,
        settings(0),
        MockBehavior::default(),
    );
    controller.assign_content();

    for slot in 0..3 {
        assert_eq!(controller.slot(slot).mode(), SlotMode::Local);
        assert!(
            binds_for(&log, slot)
                .iter()
                .all(|s| matches!(s, MediaSource::Local(_)))
        );
    }
}

#[test]
fn test_empty_stream_pool_means_all_local() {
    let (mut controller, _log) = build(
        &[],
        &["/v/x.mp4"],
        2,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();

    let status = controller.snapshot();
    assert_eq!(status.streaming_slots(), 0);
    assert!(status.slots.iter().all(|s| s.phase == SlotPhase::LocalPlaying));
}

#[test]
fn test_three_errors_fall_back_to_local() {
    let (mut controller, _log) = build(
        &["A", "B", "C", "D"],
        &["/v/x.mp4"],
        1,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();
    assert_eq!(controller.slot(0).mode(), SlotMode::Stream);

    for attempt in 1..=2 {
        fail_and_retry(&mut controller, 0);
        let slot = controller.slot(0);
        assert_eq!(slot.mode(), SlotMode::Stream);
        assert_eq!(slot.retry_count(), attempt);
        assert_eq!(slot.phase(), SlotPhase::Loading);
    }

    fail_and_retry(&mut controller, 0);

    let slot = controller.slot(0);
    assert_eq!(slot.mode(), SlotMode::Local);
    assert_eq!(slot.retry_count(), 0);
    assert_eq!(slot.phase(), SlotPhase::LocalPlaying);
    assert_eq!(slot.current(), Some(&local("/v/x.mp4")));
    assert_eq!(slot.tried_count(), 3);

    let status = controller.snapshot().slots[0].status.clone().unwrap();
    assert!(!status.is_error);
    assert_eq!(status.message, "x.mp4");
}

#[test]
fn test_exhausted_streams_fall_back_before_retry_cap() {
    let (mut controller, log) = build(
        &["A", "B"],
        &["/v/x.mp4", "/v/y.mp4", "/v/z.mp4"],
        1,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();

    let first = controller.slot(0).current().cloned().unwrap();
    fail_and_retry(&mut controller, 0);

    // The retry must pick the other stream
    let second = controller.slot(0).current().cloned().unwrap();
    assert_ne!(first, second);
    assert_eq!(controller.slot(0).mode(), SlotMode::Stream);

    fail_and_retry(&mut controller, 0);

    let slot = controller.slot(0);
    assert_eq!(slot.mode(), SlotMode::Local);
    assert_eq!(slot.retry_count(), 0);
    assert!(!controller.snapshot().slots[0].status.as_ref().unwrap().is_error);

    let streams_bound = binds_for(&log, 0)
        .into_iter()
        .filter(|s| s.as_stream().is_some())
        .count();
    assert_eq!(streams_bound, 2);
}

#[test]
fn test_media_ended_restarts_in_place() {
    let (mut controller, log) = build(&[], &["/v/y.mp4"], 1, settings(15), MockBehavior::default());
    controller.assign_content();

    let generation = controller.slot(0).generation();
    let ev = event(&controller, 0, PlayerEventKind::MediaEnded);
    assert!(controller.handle_player_event(ev).is_none());

    let slot = controller.slot(0);
    assert_eq!(slot.current(), Some(&local("/v/y.mp4")));
    assert_eq!(slot.mode(), SlotMode::Local);
    assert_eq!(slot.generation(), generation);
    assert!(log.lock().unwrap().contains(&Call::Restart(0)));
    assert_eq!(binds_for(&log, 0).len(), 1);
}

#[test]
fn test_media_loaded_clears_error_and_cancels_retry() {
    let (mut controller, log) = build(&["A", "B"], &[], 1, settings(15), MockBehavior::default());
    controller.assign_content();

    let ev = event(&controller, 0, PlayerEventKind::Error("timeout".to_string()));
    let retry = controller.handle_player_event(ev).unwrap();
    assert_eq!(controller.slot(0).retry_count(), 1);

    let status = controller.snapshot().slots[0].status.clone().unwrap();
    assert!(status.is_error);
    assert_eq!(status.message, "Player error: timeout");

    let ev = event(&controller, 0, PlayerEventKind::MediaLoaded);
    controller.handle_player_event(ev);

    let slot = controller.slot(0);
    assert_eq!(slot.phase(), SlotPhase::Playing);
    assert_eq!(slot.retry_count(), 0);
    assert!(controller.snapshot().slots[0].status.is_none());

    // Recovered, so the pending retry does nothing
    controller.on_retry_due(retry.slot, retry.generation);
    assert_eq!(binds_for(&log, 0).len(), 1);
}

#[test]
fn test_duplicate_errors_are_debounced() {
    let (mut controller, _log) = build(&["A", "B"], &[], 1, settings(15), MockBehavior::default());
    controller.assign_content();

    let ev = event(&controller, 0, PlayerEventKind::Error("one".to_string()));
    assert!(controller.handle_player_event(ev).is_some());

    let ev = event(&controller, 0, PlayerEventKind::Error("two".to_string()));
    assert!(controller.handle_player_event(ev).is_none());
    assert_eq!(controller.slot(0).retry_count(), 1);
}

#[test]
fn test_stale_events_are_ignored() {
    let (mut controller, log) = build(
        &["A", "B", "C"],
        &["/v/x.mp4"],
        1,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();

    let old = event(&controller, 0, PlayerEventKind::Error("late".to_string()));
    let old_retry = controller.handle_player_event(old.clone()).unwrap();
    controller.on_retry_due(old_retry.slot, old_retry.generation);

    let current = controller.slot(0).current().cloned();
    let retries = controller.slot(0).retry_count();
    assert_eq!(binds_for(&log, 0).len(), 2);

    // Same event again after the slot moved on
    assert!(controller.handle_player_event(old.clone()).is_none());
    controller.on_retry_due(old_retry.slot, old_retry.generation);

    assert_eq!(controller.slot(0).current().cloned(), current);
    assert_eq!(controller.slot(0).retry_count(), retries);
    assert_eq!(binds_for(&log, 0).len(), 2);

    // Unknown tile
    let bogus = PlayerEvent {
        slot: 9,
        generation: 1,
        kind: PlayerEventKind::MediaEnded,
    };
    assert!(controller.handle_player_event(bogus).is_none());
}

#[test]
fn test_media_invalid_retries_immediately() {
    let (mut controller, log) = build(
        &["A", "B", "C"],
        &["/v/x.mp4"],
        1,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();
    let first = controller.slot(0).current().cloned().unwrap();

    let ev = event(&controller, 0, PlayerEventKind::MediaInvalid);
    assert!(controller.handle_player_event(ev).is_none());

    let slot = controller.slot(0);
    assert_eq!(slot.mode(), SlotMode::Stream);
    assert_ne!(slot.current(), Some(&first));
    assert_eq!(slot.retry_count(), 1);
    assert_eq!(binds_for(&log, 0).len(), 2);
}

#[test]
fn test_bind_failures_are_bounded_by_retry_cap() {
    let behavior = MockBehavior {
        stream_binds_allowed: Some(1),
        ..Default::default()
    };
    let (mut controller, log) = build(
        &["A", "B", "C", "D", "E", "F"],
        &["/v/x.mp4"],
        1,
        settings(15),
        behavior,
    );
    controller.assign_content();
    assert_eq!(controller.slot(0).mode(), SlotMode::Stream);

    fail_and_retry(&mut controller, 0);

    // One error plus two failed binds reach the cap
    let binds = binds_for(&log, 0);
    let streams: Vec<_> = binds.iter().filter(|s| s.as_stream().is_some()).collect();
    assert_eq!(streams.len(), 3);
    assert_eq!(binds.last(), Some(&local("/v/x.mp4")));

    let slot = controller.slot(0);
    assert_eq!(slot.mode(), SlotMode::Local);
    assert_eq!(slot.retry_count(), 0);
    assert_eq!(controller.pool().failed_count(), 2);
}

#[test]
fn test_failed_assignment_bind_falls_back() {
    let behavior = MockBehavior {
        reject_streams: true,
        ..Default::default()
    };
    let (mut controller, log) = build(&["A", "B"], &["/v/x.mp4"], 2, settings(15), behavior);
    controller.assign_content();

    for idx in 0..2 {
        let slot = controller.slot(idx);
        assert_eq!(slot.mode(), SlotMode::Local);
        assert_eq!(slot.phase(), SlotPhase::LocalPlaying);
        assert_eq!(slot.tried_count(), 1);
        assert_eq!(slot.retry_count(), 0);

        let binds = binds_for(&log, idx);
        assert_eq!(binds.len(), 2);
        assert!(binds[0].as_stream().is_some());
        assert_eq!(binds[1], local("/v/x.mp4"));
    }
    assert_eq!(controller.pool().failed_count(), 2);
}

#[test]
fn test_no_media_status_only_when_visible() {
    let (mut controller, _log) = build(&[], &[], 2, settings(15), MockBehavior::default());
    controller.assign_content();

    for slot in controller.snapshot().slots {
        assert_eq!(slot.phase, SlotPhase::Exhausted);
        let status = slot.status.unwrap();
        assert!(status.is_error);
        assert_eq!(status.message, "No media available");
        assert_eq!(status.remaining_ms, None);
    }

    let (mut hidden, log) = build(&[], &[], 2, settings(15), MockBehavior::default());
    hidden.set_visible(false);
    hidden.assign_content();

    for slot in hidden.snapshot().slots {
        assert_eq!(slot.phase, SlotPhase::Exhausted);
        assert!(slot.status.is_none());
    }
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_failed_local_bind_shows_error() {
    let behavior = MockBehavior {
        reject_locals: true,
        ..Default::default()
    };
    let (mut controller, _log) = build(&[], &["/v/x.mp4"], 1, settings(15), behavior);
    controller.assign_content();

    let status = controller.snapshot().slots.remove(0);
    assert_eq!(status.phase, SlotPhase::Exhausted);
    assert_eq!(status.status.unwrap().message, "Failed to load video");
}

#[test]
fn test_rejected_local_keeps_current_clip_looping() {
    let behavior = MockBehavior {
        reject: vec![local("/v/y.mp4")],
        ..Default::default()
    };
    let (mut controller, log) = build(&[], &["/v/x.mp4", "/v/y.mp4"], 1, settings(15), behavior);

    // With two clips the picks alternate, so x is on the tile within two tries
    controller.fallback_to_local(0);
    if controller.slot(0).current().is_none() {
        controller.fallback_to_local(0);
    }
    assert_eq!(controller.slot(0).current(), Some(&local("/v/x.mp4")));
    let generation = controller.slot(0).generation();

    // y was deleted after the scan
    controller.fallback_to_local(0);
    assert_eq!(binds_for(&log, 0).last(), Some(&local("/v/y.mp4")));

    let slot = controller.slot(0);
    assert_eq!(slot.current(), Some(&local("/v/x.mp4")));
    assert_eq!(slot.generation(), generation);
    assert_eq!(slot.phase(), SlotPhase::LocalPlaying);
    let status = controller.snapshot().slots.remove(0).status.unwrap();
    assert_eq!(status.message, "Failed to load video");
    assert!(status.remaining_ms.is_some());

    // x still loops at its end
    let ended = PlayerEvent {
        slot: 0,
        generation,
        kind: PlayerEventKind::MediaEnded,
    };
    assert!(controller.handle_player_event(ended).is_none());
    assert!(log.lock().unwrap().contains(&Call::Restart(0)));

    controller.set_visible(false);
    assert!(!controller.slot(0).is_playing());
    controller.set_visible(true);
    assert!(controller.slot(0).is_playing());
}

#[test]
fn test_visibility_pauses_and_resumes() {
    let (mut controller, _log) = build(
        &["A"],
        &["/v/x.mp4", "/v/y.mp4"],
        3,
        settings(15),
        MockBehavior::default(),
    );
    controller.assign_content();
    assert!(controller.snapshot().slots.iter().all(|s| s.playing));

    controller.set_visible(false);
    let status = controller.snapshot();
    assert!(!status.visible);
    assert!(status.slots.iter().all(|s| !s.playing));

    // Nothing is visible, so nothing resumes
    controller.resume_visible();
    assert!(controller.snapshot().slots.iter().all(|s| !s.playing));

    controller.set_visible(true);
    assert!(controller.snapshot().slots.iter().all(|s| s.playing));

    controller.pause_all();
    assert!(controller.snapshot().slots.iter().all(|s| !s.playing));
}

#[test]
fn test_shutdown_releases_players() {
    let (mut controller, log) = build(&[], &["/v/x.mp4"], 2, settings(15), MockBehavior::default());
    controller.assign_content();
    controller.shutdown();

    let calls = log.lock().unwrap();
    assert!(calls.contains(&Call::Release(0)));
    assert!(calls.contains(&Call::Release(1)));
}

#[tokio::test]
async fn test_actor_serves_snapshots_and_retries() {
    let wall = WallSettings {
        retry_delay_ms: 1,
        ..settings(15)
    };
    let (controller, log) = build(&["A", "B"], &["/v/x.mp4"], 1, wall, MockBehavior::default());

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WallHandle::new("test", tx.clone());
    let runtime = tokio::runtime::Handle::current();
    let task = tokio::task::spawn_blocking(move || actor::run(controller, rx, tx, None, runtime));

    let status = handle.snapshot().await.unwrap();
    assert_eq!(status.name, "test");
    assert_eq!(status.slots[0].mode, SlotMode::Stream);
    let first = status.slots[0].source.clone();

    handle
        .send(ControllerMessage::Player(PlayerEvent {
            slot: 0,
            generation: 1,
            kind: PlayerEventKind::Error("boom".to_string()),
        }))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = handle.snapshot().await.unwrap();
    assert_eq!(status.slots[0].retry_count, 1);
    assert_ne!(status.slots[0].source, first);

    handle.send(ControllerMessage::Shutdown).unwrap();
    task.await.unwrap();

    assert!(log.lock().unwrap().contains(&Call::Release(0)));
    assert!(handle.send(ControllerMessage::Reassign).is_err());
}

#[tokio::test]
async fn test_actor_rotates_on_schedule() {
    let (controller, log) = build(&[], &["/v/x.mp4"], 1, settings(15), MockBehavior::default());

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WallHandle::new("test", tx.clone());
    let runtime = tokio::runtime::Handle::current();
    let rotation = Some(Duration::from_millis(10));
    let task = tokio::task::spawn_blocking(move || actor::run(controller, rx, tx, rotation, runtime));

    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.send(ControllerMessage::Shutdown).unwrap();
    task.await.unwrap();

    assert!(binds_for(&log, 0).len() >= 2);
    assert!(log.lock().unwrap().contains(&Call::Release(0)));
}
