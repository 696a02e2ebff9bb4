use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Command, Response, ScreenStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "vwctl")]
#[command(about = "Video Wall Daemon Control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate content: run a new assignment pass on the wall
    Reassign {
        /// Target screen (monitor), all screens if omitted
        #[arg(short, long)]
        screen: Option<String>,
    },

    /// Pause every playing tile
    Pause {
        /// Target screen (monitor), all screens if omitted
        #[arg(short, long)]
        screen: Option<String>,
    },

    /// Resume playback on visible tiles
    Resume {
        /// Target screen (monitor), all screens if omitted
        #[arg(short, long)]
        screen: Option<String>,
    },

    /// Mark the wall visible and resume its tiles
    Show {
        /// Target screen (monitor), all screens if omitted
        #[arg(short, long)]
        screen: Option<String>,
    },

    /// Mark the wall hidden and pause its tiles
    Hide {
        /// Target screen (monitor), all screens if omitted
        #[arg(short, long)]
        screen: Option<String>,
    },

    /// Query daemon status and per-tile playback state
    Query,

    /// Kill the running daemon
    Kill,

    /// Ping the daemon to check if it's running
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Reassign { screen } => Command::Reassign { screen },
        Commands::Pause { screen } => Command::PauseAll { screen },
        Commands::Resume { screen } => Command::ResumeVisible { screen },
        Commands::Show { screen } => Command::SetVisibility {
            screen,
            visible: true,
        },
        Commands::Hide { screen } => Command::SetVisibility {
            screen,
            visible: false,
        },
        Commands::Query => Command::Query,
        Commands::Kill => Command::Kill,
        Commands::Ping => Command::Ping,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: vidwall");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => {
            println!("Daemon Status:");
            println!("  Version: {}", status.version);
            println!("  Uptime: {}s", status.uptime_secs);
            for screen in &status.screens {
                print_screen(screen);
            }
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_screen(screen: &ScreenStatus) {
    println!(
        "  Screen {} ({}):",
        screen.name,
        if screen.visible { "visible" } else { "hidden" }
    );
    println!(
        "    Candidates: {} streams ({} failed), {} local files",
        screen.stream_candidates, screen.failed_streams, screen.local_candidates
    );
    println!(
        "    Tiles: {} streaming of {}",
        screen.streaming_slots(),
        screen.slots.len()
    );

    for slot in &screen.slots {
        let source = slot.source.as_deref().unwrap_or("-");
        let playing = if slot.playing { "▶" } else { "⏸" };
        println!(
            "    [{:>2}] {} {:<6} {:<10} retries={} tried={} {}",
            slot.index,
            playing,
            slot.mode.name(),
            slot.phase.name(),
            slot.retry_count,
            slot.tried_sources,
            source
        );

        if let Some(ref line) = slot.status {
            let marker = if line.is_error { "!" } else { " " };
            match line.remaining_ms {
                Some(ms) => println!("         {} {} ({}ms)", marker, line.message, ms),
                None => println!("         {} {}", marker, line.message),
            }
        }
    }
}
