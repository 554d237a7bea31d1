// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! cadex command line

use anyhow::Result;
use cadex::cli::{run_batch, Reporter, Runner, TargetFormat};
use cadex::config::ExchangeConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadex")]
#[command(about = "cadex - STEP/IGES/STL conversion, scene graphs and X3D export", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cadex.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file; the output format follows the output extension
    Convert {
        /// Input STEP, IGES or STL file
        input: PathBuf,

        /// Output file (.step, .igs, .stl, .json, .x3d, .html, .svg)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the assembly tree of a file
    Info {
        /// Input STEP, IGES or STL file
        input: PathBuf,
    },

    /// Convert many files or directories in parallel
    Batch {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "converted")]
        out: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: TargetFormat,
    },

    /// Show version information
    Version,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            Reporter::report_error(&format!("{:#}", err));
            std::process::exit(1);
        }
    }
}

/// Returns whether every requested conversion succeeded
fn run(cli: Cli) -> Result<bool> {
    let runner = || -> Result<Runner> {
        Ok(Runner::new(ExchangeConfig::load_from(cli.config.as_deref())?))
    };

    match cli.command {
        Commands::Convert { input, output } => {
            let runner = runner()?;
            let conversion = runner.convert(&input, &output)?;
            if conversion.outputs.len() > 1 {
                Reporter::report_info(&format!(
                    "Wrote {} files, one per root shape",
                    conversion.outputs.len()
                ));
            }
            if cli.verbose {
                Reporter::report_conversion(&conversion);
            } else {
                Reporter::success(&format!(
                    "Converted {} -> {}",
                    input.display(),
                    output.display()
                ));
            }
            Ok(true)
        }
        Commands::Info { input } => {
            let document = runner()?.load(&input)?;
            Reporter::report_document(&input.display().to_string(), &document);
            Ok(true)
        }
        Commands::Batch { inputs, out, format } => {
            let report = run_batch(&runner()?, &inputs, &out, format, true)?;
            Reporter::report_batch(&report);
            if !report.is_success() {
                Reporter::report_warning(&format!(
                    "{} of {} files failed to convert",
                    report.failures.len(),
                    report.total()
                ));
            }
            Ok(report.is_success())
        }
        Commands::Version => {
            println!("cadex v{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
    }
}
