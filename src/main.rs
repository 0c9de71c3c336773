use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod config;
mod correlate;
mod diagnose;
mod driver;
mod errors;
mod harness;
mod instrument;
mod interaction;
mod pipeline;
mod pysource;
mod report;
mod reporter;
mod templates;
mod util;
mod workflow;

use cli::{Command, RootArgs};

const LOG_ENV: &str = "SHDEBUG_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);

    match &args.command {
        None => workflow::run_generate(&args.global, &args.generate),
        Some(Command::Diagnose(cmd)) => workflow::run_diagnose(&args.global, cmd),
        Some(Command::Probe(cmd)) => workflow::run_probe(&args.global, cmd),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
