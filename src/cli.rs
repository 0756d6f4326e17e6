// src/cli.rs

//! CLI argument parsing using `clap` (derive feature).

use clap::{Parser, ValueEnum};

/// Command-line arguments for `monodag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "monodag",
    version,
    about = "Build, check and deploy a monorepo of interdependent workspaces.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the manifest file (TOML).
    ///
    /// Default: `Monodag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Monodag.toml")]
    pub config: String,

    /// Target to execute in every workspace that declares it (build, lint, ...).
    #[arg(long, value_name = "NAME", default_value = "build")]
    pub target: String,

    /// Restrict the run to these workspaces and their transitive dependencies.
    ///
    /// May be given multiple times. When omitted, the whole graph runs.
    #[arg(long = "scope", value_name = "WORKSPACE")]
    pub scope: Vec<String>,

    /// Maximum number of targets executing concurrently.
    ///
    /// Defaults to the available CPU parallelism.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Keep watching source files after the initial run and re-run affected
    /// workspaces on changes.
    #[arg(long)]
    pub watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MONODAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution plan, but do not run anything.
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
