use anyhow::Result;
use common::{Command, DaemonStatus, Response, WallError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use crate::DaemonState;
use crate::controller::{ControllerMessage, WallHandle};

pub async fn start(state: Arc<Mutex<DaemonState>>) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(stream: UnixStream, state: Arc<Mutex<DaemonState>>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(WallError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

async fn handle_command(command: Command, state: &Arc<Mutex<DaemonState>>) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Query => {
            // Don't hold the state lock while waiting on the walls
            let (uptime_secs, walls) = {
                let state = state.lock().await;
                (state.uptime_secs(), state.walls.clone())
            };

            let mut screens = Vec::with_capacity(walls.len());
            for wall in &walls {
                match wall.snapshot().await {
                    Ok(status) => screens.push(status),
                    Err(e) => return Response::Error(e),
                }
            }

            Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs,
                screens,
            })
        }

        Command::Reassign { screen } => {
            log::info!("Reassigning content on: {}", describe(&screen));
            dispatch(state, screen.as_deref(), || ControllerMessage::Reassign).await
        }

        Command::PauseAll { screen } => {
            log::info!("Pausing: {}", describe(&screen));
            dispatch(state, screen.as_deref(), || ControllerMessage::PauseAll).await
        }

        Command::ResumeVisible { screen } => {
            log::info!("Resuming: {}", describe(&screen));
            dispatch(state, screen.as_deref(), || ControllerMessage::ResumeVisible).await
        }

        Command::SetVisibility { screen, visible } => {
            log::info!(
                "Setting visibility of {} to {}",
                describe(&screen),
                visible
            );
            dispatch(state, screen.as_deref(), || {
                ControllerMessage::SetVisible(visible)
            })
            .await
        }

        Command::Kill => {
            log::info!("Received kill command");
            // The accept loop notices within one timeout and main shuts the walls down
            state.lock().await.should_exit = true;
            Response::Ok
        }
    }
}

fn describe(screen: &Option<String>) -> &str {
    screen.as_deref().unwrap_or("all screens")
}

/// Send a message to the named wall, or every wall when `screen` is `None`
async fn dispatch(
    state: &Arc<Mutex<DaemonState>>,
    screen: Option<&str>,
    message: impl Fn() -> ControllerMessage,
) -> Response {
    let walls = state.lock().await.walls.clone();

    let targets = match select_walls(&walls, screen) {
        Ok(targets) => targets,
        Err(e) => return Response::Error(e),
    };

    for wall in targets {
        if let Err(e) = wall.send(message()) {
            return Response::Error(e);
        }
    }

    Response::Ok
}

fn select_walls<'a>(
    walls: &'a [WallHandle],
    screen: Option<&str>,
) -> Result<Vec<&'a WallHandle>, WallError> {
    let Some(name) = screen else {
        return Ok(walls.iter().collect());
    };

    let selected: Vec<_> = walls.iter().filter(|w| w.name() == name).collect();
    if selected.is_empty() {
        return Err(WallError::NotFound(format!("No such screen: {}", name)));
    }

    Ok(selected)
}
