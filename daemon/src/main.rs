mod config;
mod controller;
mod display;
mod ipc_server;
mod macros;
mod player;
mod pool;
mod sources;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::controller::{ControllerMessage, WallHandle};
use crate::sources::Candidates;

#[derive(Parser)]
#[command(name = "vidwall")]
#[command(about = "Video wall playback daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (defaults to ~/.config/vidwall/config.toml)
    #[arg(short, long, env = "VIDWALL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let loaded = Config::load_from_path(&config_path);

    let log_level = loaded
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting video wall daemon v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());

    let config = match loaded {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded successfully");
            log::info!("  Wall settings:");
            log::info!("    - Max active players: {}", cfg.wall.max_active_players);
            log::info!(
                "    - Retries: {} ({}ms apart)",
                cfg.wall.max_retries,
                cfg.wall.retry_delay_ms
            );
            match cfg.wall.rotation_interval() {
                Some(interval) => log::info!("    - Rotation: every {}s", interval.as_secs()),
                None => log::info!("    - Rotation: disabled"),
            }
            log::info!("  Screens:");
            for screen in &cfg.screen {
                log::info!("      - {}: {}x{}", screen.name, screen.rows, screen.cols);
            }
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            Config::with_default_screens()
        }
    };

    let candidates = match Candidates::collect(&config.sources) {
        Ok(candidates) => candidates,
        Err(e) => {
            log::error!("Failed to collect media: {:#}", e);
            Candidates::default()
        }
    };

    let mut daemon_state = DaemonState::new();
    let mut wall_tasks = Vec::with_capacity(config.screen.len());
    for screen in &config.screen {
        let (handle, task) = controller::spawn(screen, &candidates, &config)?;
        daemon_state.walls.push(handle);
        wall_tasks.push(task);
    }

    let walls = daemon_state.walls.clone();
    let state = Arc::new(Mutex::new(daemon_state));

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state).await {
            log::error!("IPC server error: {}", e);
        }
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to set up signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.lock().await.should_exit = true;
    });

    // The IPC server returns once an exit is requested
    if let Err(e) = ipc_handle.await {
        log::error!("IPC server task failed: {}", e);
    }

    log::info!("Daemon shutting down");
    for wall in &walls {
        if let Err(e) = wall.send(ControllerMessage::Shutdown) {
            log::warn!("Failed to stop wall '{}': {}", wall.name(), e);
        }
    }
    for task in wall_tasks {
        if let Err(e) = task.await {
            log::error!("Wall task failed: {}", e);
        }
    }

    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
    pub walls: Vec<WallHandle>,
}

impl DaemonState {
    fn new() -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
            walls: Vec::new(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
