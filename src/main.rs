//! Binary entry point for atomio.
//!
//! This binary provides the CLI interface for importing, inspecting and
//! converting atomistic data files.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use atomio::config::AtomioConfig;
use atomio::observability::{self, LoggingConfig};
use atomio::TimePoint;
use clap::{Parser, Subcommand};
use commands::{cmd_convert, cmd_detect, cmd_formats, cmd_import};
use std::path::Path;
use std::process::ExitCode;

/// Atomio - format-agnostic import and export of atomistic data files.
#[derive(Parser)]
#[command(name = "atomio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "ATOMIO_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List the registered file formats.
    Formats {
        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Detect the format of a file.
    Detect {
        /// File path or URL.
        location: String,
    },

    /// Import a file and print a summary of its data.
    Import {
        /// File path or URL.
        location: String,

        /// Importer option as key=value (value parsed as JSON, else a string).
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Animation frame to load.
        #[arg(long)]
        frame: Option<TimePoint>,

        /// Print the loaded data as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import a file and write it in another format.
    Convert {
        /// Input file path or URL.
        input: String,

        /// Output file path.
        output: String,

        /// Output format name (see `atomio formats`).
        #[arg(short, long)]
        format: String,

        /// Importer option as key=value.
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Exporter option as key=value.
        #[arg(short = 'e', long = "export-option")]
        export_options: Vec<String>,

        /// Animation frame to export.
        #[arg(long)]
        frame: Option<TimePoint>,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(LoggingConfig::from_settings(
        Some(&config.logging),
        cli.verbose,
    )) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(atomio::Error::Canceled) => {
            eprintln!("Canceled");
            ExitCode::from(130)
        },
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &AtomioConfig) -> atomio::Result<()> {
    match cli.command {
        Commands::Formats { json } => cmd_formats(json),

        Commands::Detect { location } => cmd_detect(config, &location),

        Commands::Import {
            location,
            options,
            frame,
            json,
        } => cmd_import(config, &location, &options, frame, json),

        Commands::Convert {
            input,
            output,
            format,
            options,
            export_options,
            frame,
        } => cmd_convert(
            config,
            &input,
            &output,
            &format,
            &options,
            &export_options,
            frame,
        ),
    }
}

/// Loads configuration, then applies environment overrides.
fn load_config(path: Option<&str>) -> atomio::Result<AtomioConfig> {
    let config = match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(config_path) => AtomioConfig::load_from_file(Path::new(config_path))?,
        None => AtomioConfig::load_default(),
    };
    Ok(config.with_env_overrides())
}
