//! CLI argument definitions and shared statics.

use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file appender alive for the process lifetime.
pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "barbot",
    version,
    about = "Drink-machine control core over stdin/stdout (simulated hardware)"
)]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/barbot.toml")]
    pub config: PathBuf,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}
