mod app;
mod columns;
mod command;
mod config;
mod info;
mod input;
mod model;
mod relocate;
mod rpc;
mod selection;
mod status;
mod table;
mod tui;

use std::{fs::OpenOptions, path::Path, process};

use anyhow::{Context, Result};
use clap::Parser;
use config::{build_config, Cli};
use env_logger::{Env, Target};
use log::LevelFilter;

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    init_logging(config.log_level, config.log_file.as_deref())?;
    tui::run(config)
}

/// Logs to stderr, or appends to `log_file` when one is configured.
fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let env = Env::default().default_filter_or(level.to_string());
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp(None).format_target(false);
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.format_timestamp_secs().target(Target::Pipe(Box::new(file)));
    }
    let _ = builder.try_init();
    Ok(())
}
