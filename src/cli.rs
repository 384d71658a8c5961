// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run file-based task pipelines in isolated worker processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "Pipedag.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the tasks of the config file that are out of date.
    Run {
        /// Output path or task id to build; repeatable. Defaults to every
        /// task.
        #[arg(long = "target", value_name = "PATH|TASK")]
        targets: Vec<String>,

        /// Job id reported in progress events. Defaults to the config
        /// file's stem.
        #[arg(long, value_name = "ID")]
        job_id: Option<String>,

        #[arg(long, value_enum, default_value_t = EventFormat::Json)]
        format: EventFormat,
    },

    /// Print what `run` would do, and why, without running anything.
    Plan {
        #[arg(long = "target", value_name = "PATH|TASK")]
        targets: Vec<String>,
    },

    /// Build a karaoke video for one song.
    Karaoke {
        /// The song; the download destination with `--youtube-url`.
        #[arg(long, short, value_name = "PATH")]
        input: PathBuf,

        /// Defaults to `<input dir>/<input stem>.out`.
        #[arg(long, short, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        #[arg(long, value_name = "URL")]
        youtube_url: Option<String>,

        /// Output path or task id, e.g. `karaokedokeize`; repeatable.
        /// Defaults to the whole pipeline.
        #[arg(long = "target", value_name = "PATH|TASK")]
        targets: Vec<String>,

        /// Defaults to the input's file stem.
        #[arg(long, value_name = "ID")]
        job_id: Option<String>,

        #[arg(long, value_enum, default_value_t = EventFormat::Json)]
        format: EventFormat,

        /// Only print the plan.
        #[arg(long)]
        dry_run: bool,
    },

    /// Worker process entry point: reads a job from stdin and writes
    /// progress events to stdout.
    #[command(hide = true)]
    Worker,
}

/// How progress events are written to stdout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    /// One JSON wire event per line.
    Json,
    /// Server-sent-event frames.
    Sse,
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
