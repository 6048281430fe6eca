//! pixel-fleet - one compositor window per pixel
//!
//! Without a subcommand an interactive menu asks what to do.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pixel_fleet::cleanup::kill_stray;
use pixel_fleet::config::Config;
use pixel_fleet::pipeline;
use pixel_fleet::process::{Launcher, ProcScanner, SystemLauncher};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pixel-fleet", version)]
struct Cli {
    /// JSON config file (defaults are used for missing fields).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Bootstrap the fleet, then play the frames.
    Run,
    /// Play the frames on an already running fleet.
    Play,
    /// Start the bus session and the fleet, place windows, paint the test pattern.
    Bootstrap,
    /// Terminate every compositor, painter and the bus daemon of this system.
    Cleanup,
    /// Block the lid switch while plasma inhibits sleep.
    LidGuard,
}

const MENU: &str = "\
1) bootstrap + play
2) play only
3) bootstrap only
4) cleanup
> ";

fn parse_choice(input: &str) -> Option<Command> {
    match input.trim() {
        "1" => Some(Command::Run),
        "2" => Some(Command::Play),
        "3" => Some(Command::Bootstrap),
        "4" => Some(Command::Cleanup),
        _ => None,
    }
}

fn prompt() -> anyhow::Result<Command> {
    let mut stdout = std::io::stdout();
    stdout.write_all(MENU.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    parse_choice(&line).with_context(|| format!("invalid choice {:?}", line.trim()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr, so the menu owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("load config")?;
    let command = match cli.cmd {
        Some(cmd) => cmd,
        None => prompt()?,
    };

    let launcher: Arc<dyn Launcher> = Arc::new(SystemLauncher);
    match command {
        Command::Run => {
            let fleet = pipeline::bootstrap(&config, launcher).await.context("bootstrap")?;
            pipeline::play(&config, &fleet).await.context("playback")?;
        }
        Command::Play => {
            let fleet = pipeline::attach(&config, launcher, &ProcScanner::default())
                .context("attach to running fleet")?;
            pipeline::play(&config, &fleet).await.context("playback")?;
        }
        Command::Bootstrap => {
            let fleet = pipeline::bootstrap(&config, launcher).await.context("bootstrap")?;
            tracing::info!("Fleet ready: {:?}", fleet.registry.pids());
        }
        Command::Cleanup => {
            kill_stray(&config, &ProcScanner::default(), launcher.as_ref()).context("cleanup")?;
        }
        Command::LidGuard => {
            pixel_fleet::lid::run().await.context("lid guard")?;
        }
    }
    Ok(())
}
