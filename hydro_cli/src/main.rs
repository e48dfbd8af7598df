mod cli;
mod error_fmt;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use eyre::WrapErr;
use std::path::Path;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    match try_main(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            std::process::exit(error_fmt::exit_code_for_error(&err));
        }
    }
}

fn try_main(cli: Cli) -> eyre::Result<i32> {
    color_eyre::install()?;

    let (config, defaulted) = load_config(&cli.config)?;
    init_logging(&cli, &config.logging);
    if defaulted {
        tracing::warn!(path = %cli.config.display(), "config file not found; using defaults (dosing disabled)");
    }

    match cli.cmd {
        Commands::Run {
            period_secs,
            max_cycles,
        } => run::run_loop(&config, period_secs, max_cycles, cli.json),
        Commands::Cycle { wait_startup } => run::run_once(&config, wait_startup, cli.json),
        Commands::Check => run::check(&config, cli.json),
    }
}

/// Load and validate the TOML config; a missing file falls back to
/// defaults so `check` and simulation runs work out of the box.
fn load_config(path: &Path) -> eyre::Result<(hydro_config::Config, bool)> {
    if !path.exists() {
        return Ok((hydro_config::Config::default(), true));
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let config = hydro_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    config
        .validate()
        .wrap_err_with(|| format!("invalid config {}", path.display()))?;
    Ok((config, false))
}

/// Console logs go to stderr so stdout stays clean for JSON outcome lines;
/// an optional JSON-lines file layer is driven by the config.
fn init_logging(cli: &Cli, logging: &hydro_config::Logging) {
    use tracing_subscriber::EnvFilter;

    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| cli.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().unwrap_or_else(|| "hydrodose.log".as_ref());
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| ".".as_ref()), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .init();
    } else if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
