use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::backup::log::LogTracker;
use crate::cli::args::Cli;
use crate::cli::commands::maintenance::{run_maintenance, MaintenanceOptions};
use crate::cli::commands::sequence::{run_sequence, SequenceOptions};
use crate::cli::commands::{exit_for_error, plan, Plan};
use crate::config::load::{load_config, CONFIG_FILE};
use crate::context::Context;
use crate::disk::dialect;
use crate::disk::registry::Registry;
use crate::error::CryptbakError;
use crate::signal_handler::signal_handler;
use crate::types::RunMode;
use crate::util::command::SystemRunner;
use crate::util::console::Terminal;

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.verbose);
    if let Err(err) = execute(&cli) {
        exit_for_error(&err);
    }
    Ok(())
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

fn execute(cli: &Cli) -> crate::error::Result<()> {
    // Reject bad command lines before loading anything or touching a device.
    let plan = plan(&cli.commands)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = load_config(&config_path)?;
    let run_mode = RunMode {
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };
    let runner = SystemRunner::new(run_mode);
    let console = Terminal;
    let manager = dialect::detect()?;
    let ctx = Context {
        runner: &runner,
        console: &console,
        manager: manager.as_ref(),
        config: &config,
        run_mode,
    };
    let registry = Registry::new(&config.registry_dir);

    match plan {
        Plan::Exclusive(command) => run_maintenance(
            &ctx,
            &registry,
            command,
            &MaintenanceOptions {
                device: cli.device.as_deref(),
                label: cli.label.as_deref(),
            },
        ),
        Plan::Sequence(steps) => {
            let tracker = LogTracker::default();
            signal_handler(&tracker);
            let options = SequenceOptions {
                device: cli.device.clone(),
                source: cli.src.clone(),
                host: hostname()?,
                rsync_extra: rsync_extra(run_mode),
                tracker,
            };
            run_sequence(&ctx, &registry, &steps, &options).map(|_| ())
        }
    }
}

fn hostname() -> crate::error::Result<String> {
    let name = nix::unistd::gethostname()
        .map_err(|e| CryptbakError::message(format!("read hostname: {}", e)))?;
    name.into_string()
        .map_err(|name| CryptbakError::message(format!("hostname {:?} is not valid UTF-8", name)))
}

fn rsync_extra(run_mode: RunMode) -> Vec<String> {
    (0..run_mode.dry_run).map(|_| "--dry-run".to_string()).collect()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .try_init();
}
