mod clock;
mod config;
mod console;
mod diagnostics;
mod logging;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;

use crate::clock::duration::parse_clock_time;
use crate::clock::engine::ClockEngine;
use crate::clock::events::EventMailbox;
use crate::clock::side::TimeControl;
use crate::config::{ClockConfig, load_clock_config};
use crate::console::{ConsoleOptions, run_console};
use crate::logging::{LoggingConfig, init_logging};

const DEFAULT_CONFIG_PATH: &str = "clock.json";

#[derive(Parser, Debug)]
#[command(
    name = "chessclock",
    version,
    about = "Two-player chess clock driven from the terminal"
)]
struct Cli {
    /// JSON file with clock settings and extra presets [default: clock.json if present]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preset to start with (see --list-presets)
    #[arg(long)]
    preset: Option<String>,

    /// Starting time per side as mm:ss
    #[arg(long)]
    starting_time: Option<String>,

    /// Increment per move as mm:ss
    #[arg(long)]
    increment: Option<String>,

    /// Tick interval in milliseconds, overriding the config file
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Print status as JSON
    #[arg(long)]
    json: bool,

    /// Print every time update, not only state changes
    #[arg(long)]
    show_ticks: bool,

    #[arg(long)]
    list_presets: bool,

    /// Measure scheduler pacing and exit
    #[arg(long)]
    diagnostics: bool,

    #[arg(long, default_value_t = 50)]
    diagnostic_ticks: u32,

    /// Log filter in env_logger syntax, e.g. "debug"
    #[arg(long)]
    log: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(tick_ms) = cli.tick_ms {
        if tick_ms == 0 {
            bail!("--tick-ms must be greater than zero");
        }
        config.settings.tick_interval = Duration::from_millis(tick_ms);
    }

    if cli.list_presets {
        for preset in &config.presets {
            println!("{preset}");
        }
        return Ok(());
    }

    if cli.diagnostics {
        return diagnostics::run_diagnostics(
            config.settings.tick_interval,
            cli.diagnostic_ticks,
        );
    }

    let time_control = select_time_control(&cli, &config)?;
    let mailbox = Arc::new(EventMailbox::new());
    let engine = ClockEngine::new(time_control, config.settings, mailbox.clone());
    println!(
        "{time_control}, tick every {} ms",
        engine.settings().tick_interval.as_millis()
    );

    let options = ConsoleOptions {
        json: cli.json,
        show_ticks: cli.show_ticks,
    };
    run_console(&engine, mailbox, &config, options, io::stdin().lock())
}

fn resolve_config(explicit: Option<&Path>) -> Result<ClockConfig> {
    if let Some(path) = explicit {
        return load_clock_config(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    let fallback = Path::new(DEFAULT_CONFIG_PATH);
    if fallback.exists() {
        return load_clock_config(fallback)
            .with_context(|| format!("failed to load {}", fallback.display()));
    }
    Ok(ClockConfig::default())
}

fn select_time_control(cli: &Cli, config: &ClockConfig) -> Result<TimeControl> {
    let base = match cli.preset.as_deref() {
        Some(id) => {
            config
                .find_preset(id)
                .ok_or_else(|| anyhow!("unknown preset '{id}'; see --list-presets"))?
                .time_control
        }
        None => config.default_time_control(),
    };

    let starting_time = match cli.starting_time.as_deref() {
        Some(text) => parse_clock_time(text).context("invalid --starting-time")?,
        None => base.starting_time,
    };
    let increment = match cli.increment.as_deref() {
        Some(text) => parse_clock_time(text).context("invalid --increment")?,
        None => base.increment,
    };
    TimeControl::new(starting_time, increment).context("invalid --starting-time")
}
