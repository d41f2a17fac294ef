//! g1835: replay a scripted 1835 session and print its game log.

mod script;

use anyhow::{Context, Result};
use clap::Parser;
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use g1835_core::{
    config::{self, GameConfig},
    Game,
};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::script::Script;

/// Replay a JSON script of player actions and train/operating events against
/// a fresh 1835 game.
#[derive(Parser)]
#[command(name = "g1835")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Script to replay
    script: PathBuf,

    /// Game configuration; defaults to the user config file
    #[arg(env = "G1835_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the diagnostics log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_dir)?;

    let config = match &cli.config {
        Some(path) => GameConfig::load_from(path)?,
        None => {
            config::ensure_default_config()?;
            GameConfig::load()?
        }
    };

    let raw = fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read script {}", cli.script.display()))?;
    let script: Script =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse script {}", cli.script.display()))?;
    tracing::info!(path = %cli.script.display(), steps = script.steps.len(), "script loaded");

    let mut game = Game::in_memory(&config)?;
    let outcome = script.replay(&mut game);

    for message in game.state().log().messages() {
        println!("{message}");
    }
    outcome
}

/// Diagnostics go to stderr and to `<log_dir>/g1835.log`; stdout carries
/// only the game log.
fn setup_tracing(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("g1835.log"))
        .with_context(|| format!("failed to open the log file in {}", log_dir.display()))?;

    let console = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let file = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(console)
        .with(file)
        .init();
    Ok(())
}
