// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::EventClass;

/// Command-line arguments for `kinotify-watch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kinotify-watch",
    version,
    about = "Recursively watch directory trees with inotify and print changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Directories to watch, in addition to the `[[watch]]` roots of the config.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// Default: `KINOTIFY_CONFIG`, else `kinotify.toml` in the current
    /// working directory. The default file may be missing.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Descend into hidden directories of the PATH arguments.
    #[arg(long)]
    pub include_hidden: bool,

    /// Event classes for the PATH arguments, comma separated
    /// (e.g. `create,delete,move`). Default: `[default].events`.
    #[arg(long, value_name = "CLASSES", value_delimiter = ',', value_parser = parse_event_class)]
    pub events: Vec<EventClass>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KINOTIFY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the effective roots, but don't watch.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_event_class(s: &str) -> Result<EventClass, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
