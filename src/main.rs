//! tickstate - demo host
//!
//! Drives a game shell and a movement controller on a fixed-rate tick loop.

mod game;
mod movement;

use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tickstate_core::{MachineConfig, NotificationFilter, NotificationKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tickstate")]
#[command(about = "Tick-driven behavior runtime demo host")]
#[command(version)]
struct Cli {
    /// Path to a YAML machine config (defaults to TICKSTATE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to run before stopping
    #[arg(short = 'n', long, env = "TICKSTATE_TICKS", default_value_t = 240)]
    ticks: u64,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Print the formatted transition trace
    #[arg(long)]
    trace: bool,

    /// Start the game shell from a save file
    #[arg(long)]
    load: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration: explicit file or TICKSTATE_CONFIG, then env overrides
    let config = match &cli.config {
        Some(path) => {
            let mut config = MachineConfig::from_file(path).map_err(|e| {
                tracing::error!("Failed to load config: {}", e);
                e
            })?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => {
            let config = MachineConfig::load().map_err(|e| {
                tracing::error!("Failed to load config: {}", e);
                e
            })?;
            if let Ok(path) = std::env::var("TICKSTATE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            config
        }
    };

    tracing::info!("Starting tickstate demo");
    tracing::info!("  Capability delivery: {:?}", config.capability_delivery);
    tracing::info!("  Ticks: {} every {}ms", cli.ticks, cli.tick_ms);

    let game = Rc::new(RefCell::new(game::Game {
        save_exists: cli.load,
        ..Default::default()
    }));
    let loader = game::SaveLoader::new(20);
    let mut shell = game::build(&game, config.clone(), loader.clone())?;

    let character = Rc::new(RefCell::new(movement::Character::default()));
    let mut mover = movement::build(&character, config.clone())?;

    if cli.trace {
        shell.set_trace_sink(|line| println!("[shell] {line}"));
        mover.set_trace_sink(|line| println!("[mover] {line}"));
    }

    shell.subscribe(
        NotificationFilter::only([NotificationKind::StateChanged]),
        |n| tracing::info!(target: "shell", "{:?}", n),
    );

    let mut interval = tokio::time::interval(Duration::from_millis(cli.tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut tick = 0u64;
    while tick < cli.ticks {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping...");
                break;
            }
            _ = interval.tick() => {}
        }

        tick += 1;
        loader.poll();

        // A pause toggle every 50 ticks; ignored outside of play.
        if tick % 50 == 0 {
            shell.invoke_event(game::TogglePause)?;
        }
        // Machine-wide pause of the movement controller for ticks 100..120.
        mover.set_paused((100..120).contains(&tick))?;

        if let Err(e) = shell.update().and_then(|_| mover.update()) {
            tracing::error!(code = e.error_code(), "tick {} failed: {}", tick, e);
            return Err(e.into());
        }

        if game.borrow().finished {
            tracing::info!("Game shell finished at tick {}", tick);
            break;
        }
    }

    tracing::info!(
        "Stopped after {} ticks: score {}, {} jumps",
        tick,
        game.borrow().score,
        character.borrow().jumps
    );
    Ok(())
}
