//! Command handlers: config resolution, then one pipeline or session run.
use crate::cli::{DiagnoseArgs, GenerateArgs, GlobalArgs, ProbeArgs};
use crate::config::{load_config, validate_config, DebugConfig};
use crate::diagnose::{run_diagnostics, DiagnoseOptions};
use crate::driver::{SessionLimits, Subject};
use crate::interaction::{Interaction, InteractionResult, TranscriptEntry, Verdict};
use crate::pipeline::{self, GenerateRequest};
use crate::reporter::{ConsoleReporter, Reporter};
use crate::util::preview;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const PROBE_PREVIEW_BYTES: usize = 2_000;

/// Load config and apply CLI overrides.
pub fn resolve_config(global: &GlobalArgs) -> Result<DebugConfig> {
    let cwd = env::current_dir().context("resolve current directory")?;
    let mut config = load_config(global.config.as_deref(), &cwd)?;
    apply_overrides(&mut config, global);
    validate_config(&config)?;
    Ok(config)
}

fn apply_overrides(config: &mut DebugConfig, global: &GlobalArgs) {
    if let Some(subject) = &global.subject {
        config.subject = subject.clone();
    }
    if let Some(ms) = global.settle_ms {
        config.timing.settle_ms = ms;
    }
    if let Some(ms) = global.join_timeout_ms {
        config.timing.join_timeout_ms = ms;
        config.timing.session_limit_ms = config.timing.session_limit_ms.max(ms);
    }
}

pub fn run_generate(global: &GlobalArgs, args: &GenerateArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let out = args.out.clone().unwrap_or_else(|| config.harness.output.clone());
    let request = GenerateRequest {
        dir: &args.dir,
        report: args.report.as_deref(),
        out: &out,
        config: &config,
    };
    let summary = pipeline::generate(&request)?;

    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize generate summary")?;
        println!("{text}");
    } else {
        let mut reporter = ConsoleReporter::stdout();
        pipeline::print_summary(&summary, &args.dir, &mut reporter);
    }
    Ok(())
}

pub fn run_diagnose(global: &GlobalArgs, args: &DiagnoseArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let subject = resolve_subject(&config, &args.dir)?;
    let mut reporter = ConsoleReporter::stdout();
    let options = DiagnoseOptions {
        network: args.network,
    };
    run_diagnostics(&subject, &config, options, &mut reporter)?;
    Ok(())
}

pub fn run_probe(global: &GlobalArgs, args: &ProbeArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let subject = resolve_subject(&config, &args.dir)?;
    let limits = SessionLimits {
        session_limit: config.timing.session_limit(),
    };
    let mut reporter = ConsoleReporter::stdout();
    if args.same_session {
        let label = args.commands.join("; ");
        let result = session_interaction(&args.commands, &config)
            .run(&subject, limits)
            .with_context(|| format!("probe session {label:?}"))?;
        report_probe(&label, &result, &config, &mut reporter);
        return Ok(());
    }
    for command in &args.commands {
        let result = probe_interaction(command, &config)
            .run(&subject, limits)
            .with_context(|| format!("probe {command:?}"))?;
        report_probe(command, &result, &config, &mut reporter);
    }
    Ok(())
}

fn resolve_subject(config: &DebugConfig, dir: &Path) -> Result<Subject> {
    Subject::parse(&config.subject, Some(dir)).with_context(|| {
        format!(
            "subject {:?} is not runnable from {}; compile the shell first (e.g. `make`)",
            config.subject,
            dir.display()
        )
    })
}

/// Prompt, command, command window, `exit`, join.
pub fn probe_interaction(command: &str, config: &DebugConfig) -> Interaction {
    Interaction::new(config.timing.join_timeout())
        .read(config.timing.startup())
        .send(command)
        .read(config.timing.command_window())
        .send("exit")
}

/// Prompt, then each command followed by its own command window, `exit`, join.
pub fn session_interaction(commands: &[String], config: &DebugConfig) -> Interaction {
    let window = config.timing.command_window();
    commands
        .iter()
        .fold(
            Interaction::new(config.timing.join_timeout()).read(config.timing.startup()),
            |interaction, command| interaction.send(command.as_str()).read(window),
        )
        .send("exit")
}

fn report_probe(
    command: &str,
    result: &InteractionResult,
    config: &DebugConfig,
    reporter: &mut dyn Reporter,
) {
    reporter.header(&format!("Testing command: {command}"));
    for entry in &result.transcript {
        match entry {
            TranscriptEntry::Sent { line } => reporter.info(&format!("Sent: {}", preview(line, 200))),
            TranscriptEntry::Received { stdout, stderr } => {
                if !stdout.is_empty() {
                    reporter.detail(&format!("stdout: {}", preview(stdout, PROBE_PREVIEW_BYTES)));
                }
                if !stderr.is_empty() {
                    reporter.detail(&format!("stderr: {}", preview(stderr, PROBE_PREVIEW_BYTES)));
                }
            }
            TranscriptEntry::Signalled { signal } => reporter.info(&format!("Signal: {signal}")),
            TranscriptEntry::InputClosed => reporter.failure("Subject closed its input early"),
            TranscriptEntry::Joined { .. } => {}
        }
    }
    reporter.info("Results:");
    reporter.detail(&format!(
        "Command output: {}",
        preview(&result.stdout, PROBE_PREVIEW_BYTES)
    ));
    reporter.detail(&format!(
        "Error output: {}",
        preview(&result.stderr, PROBE_PREVIEW_BYTES)
    ));
    match (result.verdict, result.exit_code) {
        (Verdict::Inconclusive, _) => reporter.failure(&format!(
            "Subject did not exit within {} ms and was killed",
            config.timing.join_timeout_ms
        )),
        (Verdict::Completed, Some(code)) => reporter.detail(&format!("Exit code: {code}")),
        (Verdict::Completed, None) => reporter.detail("Exit code: none (terminated by signal)"),
    }
}
