//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "hydrodose", version, about = "Reservoir auto-dosing CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/hydrodose.toml")]
    pub config: PathBuf,

    /// Emit cycle outcomes and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run dosing cycles on a fixed period until interrupted
    Run {
        /// Seconds between cycle attempts
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        period_secs: u64,

        /// Stop after this many cycles (0 = run until ctrl-c)
        #[arg(long, value_name = "N", default_value_t = 0)]
        max_cycles: u64,
    },
    /// Evaluate one dosing cycle and print its outcome
    Cycle {
        /// Sleep through the startup safety delay before evaluating
        #[arg(long, action = ArgAction::SetTrue)]
        wait_startup: bool,
    },
    /// Probe collaborator health (sensor read + pump status)
    Check,
}
