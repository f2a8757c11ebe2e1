//! haloctl - Command-line client for the halo LED daemon
//!
//! # Usage
//!
//! ```bash
//! haloctl set thinking
//! haloctl status
//! haloctl status --json
//! haloctl off
//! haloctl cycle          # walk through every mood
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use halo_core::messages::Status;
use halo_core::{LedClient, Mood};

/// Mood sequence shown by `haloctl cycle`
const CYCLE: [Mood; 6] = [
    Mood::Off,
    Mood::Idle,
    Mood::Listening,
    Mood::Thinking,
    Mood::Speaking,
    Mood::Off,
];

/// haloctl - control the halo LED daemon
#[derive(Parser, Debug)]
#[command(name = "haloctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon control socket
    #[arg(short = 's', long, env = "LED_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    timeout_ms: u64,

    /// Log protocol details to stderr
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Switch to a mood (off, idle, listening, thinking, speaking)
    Set {
        /// Mood name
        mood: String,
    },
    /// Show daemon status
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn the strip off
    Off,
    /// Show every mood in turn
    Cycle {
        /// Seconds to hold each mood
        #[arg(long, default_value_t = 3)]
        hold_secs: u64,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("haloctl={level},halo_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_status(status: &Status) -> String {
    let channel = status
        .dma_channel
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    let mut out = format!(
        "mood:        {}\n\
         output:      {} (channel {channel})\n\
         exclusive:   {}\n\
         generation:  {} (rendered {})\n\
         frames:      {} ({} failed)",
        status.mood,
        status.driver_mode,
        if status.exclusive { "yes" } else { "no" },
        status.generation,
        status.rendered_generation,
        status.frames_rendered,
        status.transfer_failures,
    );
    if !status.exclusive {
        out.push_str("\nwarning:     transfer channel is not isolated from audio");
    }
    if status.shutting_down {
        out.push_str("\nnote:        daemon is shutting down");
    }
    out
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = cli
        .socket
        .map_or_else(LedClient::with_default_path, LedClient::new)
        .with_timeout(Duration::from_millis(cli.timeout_ms));

    match cli.command {
        Command::Set { mood } => {
            let status = client
                .set_mood_named(&mood)
                .await
                .with_context(|| format!("Failed to set mood '{mood}'"))?;
            println!("{}", status.mood);
        }
        Command::Status { json } => {
            let status = client.status().await.context("Failed to query status")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", format_status(&status));
            }
        }
        Command::Off => {
            client.off().await.context("Failed to turn LEDs off")?;
        }
        Command::Cycle { hold_secs } => {
            for (i, mood) in CYCLE.iter().enumerate() {
                client
                    .set_mood(*mood)
                    .await
                    .with_context(|| format!("Failed to set mood '{mood}'"))?;
                println!("{mood}");
                if i + 1 < CYCLE.len() {
                    tokio::time::sleep(Duration::from_secs(hold_secs)).await;
                }
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn status() -> Status {
        Status {
            mood: "listening".to_string(),
            exclusive: true,
            driver_mode: "exclusive".to_string(),
            dma_channel: Some(5),
            generation: 2,
            rendered_generation: 2,
            frames_rendered: 17,
            transfer_failures: 0,
            shutting_down: false,
        }
    }

    #[test]
    fn test_format_exclusive() {
        assert_eq!(
            format_status(&status()),
            "mood:        listening\n\
             output:      exclusive (channel 5)\n\
             exclusive:   yes\n\
             generation:  2 (rendered 2)\n\
             frames:      17 (0 failed)"
        );
    }

    #[test]
    fn test_format_degraded_warns() {
        let mut s = status();
        s.exclusive = false;
        s.driver_mode = "shared".to_string();
        s.dma_channel = None;
        let text = format_status(&s);
        assert!(text.contains("shared (channel -)"));
        assert!(text.ends_with("transfer channel is not isolated from audio"));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["haloctl", "set", "thinking"]).unwrap();
        assert!(matches!(cli.command, Command::Set { ref mood } if mood == "thinking"));

        let cli =
            Cli::try_parse_from(["haloctl", "-s", "/tmp/a.sock", "status", "--json"]).unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/a.sock")));
        assert!(matches!(cli.command, Command::Status { json: true }));
    }
}
