//! CLI argument parsing.
//!
//! With no subcommand the tool generates the debug harness; `diagnose` and
//! `probe` talk to the subject shell directly.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "shdebug",
    version,
    about = "Debug harness generator for shell project test suites",
    after_help = "Commands:\n  [REPORT]                  Generate debug_tests.py from a failure report (default)\n  diagnose [--network]      Run targeted checks against the subject shell\n  probe <COMMAND>...        Run commands through the subject and show raw output\n\nExamples:\n  shdebug\n  shdebug FEEDBACK_run2.txt --out debug_tests.py\n  shdebug --json\n  shdebug diagnose --subject ./mysh\n  shdebug probe 'echo hello' 'ls | wc -l'\n  shdebug probe --same-session 'x=1' 'echo $x'"
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub generate: GenerateArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Options accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (defaults to ./shdebug.json, then the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log pipeline and driver activity to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Subject command line, e.g. "./mysh"
    #[arg(long, value_name = "CMD", global = true)]
    pub subject: Option<String>,

    /// Delay after each write before output is drained
    #[arg(long, value_name = "MS", global = true)]
    pub settle_ms: Option<u64>,

    /// Bound on waiting for the subject to exit
    #[arg(long, value_name = "MS", global = true)]
    pub join_timeout_ms: Option<u64>,
}

/// Harness generation inputs.
#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Failure report (defaults to the first FEEDBACK*.txt in --dir)
    #[arg(value_name = "REPORT")]
    pub report: Option<PathBuf>,

    /// Directory holding the report and the tests_*.py sources
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Output path for the harness, relative to --dir
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Emit the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Diagnose(DiagnoseArgs),
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Run targeted checks against the subject shell")]
pub struct DiagnoseArgs {
    /// Also run the server/client message exchange on a free local port
    #[arg(long)]
    pub network: bool,

    /// Directory the subject is resolved against and run in
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Run commands through the subject, one session each by default")]
pub struct ProbeArgs {
    /// Commands to send to the subject
    #[arg(value_name = "COMMAND", required = true)]
    pub commands: Vec<String>,

    /// Send every command to one session, reading output after each
    #[arg(long)]
    pub same_session: bool,

    /// Directory the subject is resolved against and run in
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}
