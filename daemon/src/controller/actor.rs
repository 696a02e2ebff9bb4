//! Thread wrapper that serializes everything touching a controller
//!
//! Player backends, IPC handlers and timers all talk to a wall by posting
//! [`ControllerMessage`]s into its inbox. Backend calls block, so each wall
//! drains its inbox on a blocking thread and only its timers run as tasks.

use anyhow::Result;
use common::{ScreenStatus, WallError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{PlaybackController, ScheduledRetry};
use crate::config::{Config, ScreenConfig};
use crate::display::TileBoard;
use crate::player::{self, PlayerEvent};
use crate::pool::ResourcePool;
use crate::sources::Candidates;

#[derive(Debug)]
pub enum ControllerMessage {
    Player(PlayerEvent),
    RetryDue { slot: usize, generation: u64 },
    Reassign,
    Rotate,
    PauseAll,
    ResumeVisible,
    SetVisible(bool),
    Snapshot(oneshot::Sender<ScreenStatus>),
    Shutdown,
}

/// Cloneable address of a running wall
#[derive(Debug, Clone)]
pub struct WallHandle {
    name: String,
    tx: mpsc::UnboundedSender<ControllerMessage>,
}

impl WallHandle {
    pub fn new(name: impl Into<String>, tx: mpsc::UnboundedSender<ControllerMessage>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, msg: ControllerMessage) -> Result<(), WallError> {
        self.tx
            .send(msg)
            .map_err(|_| WallError::Ipc(format!("Wall '{}' is not running", self.name)))
    }

    pub async fn snapshot(&self) -> Result<ScreenStatus, WallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ControllerMessage::Snapshot(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| WallError::Ipc(format!("Wall '{}' stopped before replying", self.name)))
    }
}

/// Build the players for one screen and start its controller thread
pub fn spawn(
    screen: &ScreenConfig,
    candidates: &Candidates,
    config: &Config,
) -> Result<(WallHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let players = (0..screen.tile_count())
        .map(|slot| player::create_backend(slot, &config.player, tx.clone()))
        .collect::<Result<Vec<_>>>()?;

    let pool = ResourcePool::new(candidates.streams.clone(), candidates.locals.clone());
    let controller = PlaybackController::new(
        screen.name.clone(),
        pool,
        players,
        Box::new(TileBoard::new(&screen.name)),
        config.wall.clone(),
    );

    log::info!(
        "Starting wall '{}' ({}x{} tiles)",
        screen.name,
        screen.rows,
        screen.cols
    );

    let handle = WallHandle::new(screen.name.clone(), tx.clone());
    let rotation = config.wall.rotation_interval();
    let runtime = Handle::current();

    // Player calls block, so keep them off the async workers
    let task = tokio::task::spawn_blocking(move || run(controller, rx, tx, rotation, runtime));

    Ok((handle, task))
}

/// Drive a controller until `Shutdown` arrives or every sender is gone.
///
/// Must run on a blocking thread; timers are spawned onto `runtime`.
pub fn run(
    mut controller: PlaybackController,
    mut inbox: mpsc::UnboundedReceiver<ControllerMessage>,
    outbox: mpsc::UnboundedSender<ControllerMessage>,
    rotation: Option<Duration>,
    runtime: Handle,
) {
    controller.assign_content();

    if let Some(period) = rotation {
        schedule_rotation(&runtime, &outbox, period);
    }

    while let Some(msg) = inbox.blocking_recv() {
        match msg {
            ControllerMessage::Player(event) => {
                if let Some(retry) = controller.handle_player_event(event) {
                    schedule_retry(&runtime, &outbox, retry);
                }
            }
            ControllerMessage::RetryDue { slot, generation } => {
                controller.on_retry_due(slot, generation);
            }
            ControllerMessage::Reassign => controller.assign_content(),
            ControllerMessage::Rotate => {
                log::info!("[{}] Rotating content", controller.screen());
                controller.assign_content();
            }
            ControllerMessage::PauseAll => controller.pause_all(),
            ControllerMessage::ResumeVisible => controller.resume_visible(),
            ControllerMessage::SetVisible(visible) => controller.set_visible(visible),
            ControllerMessage::Snapshot(reply) => {
                let _ = reply.send(controller.snapshot());
            }
            ControllerMessage::Shutdown => break,
        }
    }

    controller.shutdown();
    log::info!("[{}] Wall stopped", controller.screen());
}

/// Post `Rotate` every `period` until the wall's inbox closes
fn schedule_rotation(
    runtime: &Handle,
    outbox: &mpsc::UnboundedSender<ControllerMessage>,
    period: Duration,
) {
    let outbox = outbox.clone();
    runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if outbox.send(ControllerMessage::Rotate).is_err() {
                break;
            }
        }
    });
}

fn schedule_retry(
    runtime: &Handle,
    outbox: &mpsc::UnboundedSender<ControllerMessage>,
    retry: ScheduledRetry,
) {
    let outbox = outbox.clone();
    runtime.spawn(async move {
        tokio::time::sleep(retry.delay).await;
        let _ = outbox.send(ControllerMessage::RetryDue {
            slot: retry.slot,
            generation: retry.generation,
        });
    });
}
