//! Targeted checks run natively against the subject shell.
//!
//! Each check is one scripted interaction (two for the network exchange)
//! followed by a pure evaluation of the prompt-stripped output. A check whose
//! join times out is `Inconclusive`, never retried.
use crate::config::DebugConfig;
use crate::driver::{Session, SessionLimits, Subject};
use crate::interaction::{Interaction, InteractionResult, TranscriptEntry, Verdict};
use crate::reporter::Reporter;
use crate::util::preview;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::net::TcpListener;
use std::sync::OnceLock;
use std::time::Duration;

pub const SPECIAL_CHARS: &str = "@#*%*(*#&(%*&*)*&^%*#@";
pub const BACKGROUND_DONE: &str = "[1]+ Done sleep 1";
pub const NETWORK_MESSAGE: &str = "test_message";
pub const AFTER_SIGNAL: &str = "after_signal";
const PREVIEW_BYTES: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    EchoSpecialChars,
    PipeVariables,
    FailingPipeStage,
    BackgroundDone,
    JobIdReset,
    SigintSurvival,
    NetworkExchange,
}

impl CheckKind {
    pub const STANDARD: [CheckKind; 6] = [
        CheckKind::EchoSpecialChars,
        CheckKind::PipeVariables,
        CheckKind::FailingPipeStage,
        CheckKind::BackgroundDone,
        CheckKind::JobIdReset,
        CheckKind::SigintSurvival,
    ];

    pub fn title(self) -> &'static str {
        match self {
            CheckKind::EchoSpecialChars => "Echo special characters",
            CheckKind::PipeVariables => "Variable assignment in pipe",
            CheckKind::FailingPipeStage => "Pipe with failing command",
            CheckKind::BackgroundDone => "Background job completion message",
            CheckKind::JobIdReset => "Job ID reset",
            CheckKind::SigintSurvival => "Shell survives SIGINT",
            CheckKind::NetworkExchange => "Server/client message exchange",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub outcome: Outcome,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnoseSummary {
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub failed: usize,
    pub inconclusive: usize,
}

impl DiagnoseSummary {
    fn push(&mut self, result: CheckResult) {
        match result.outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail => self.failed += 1,
            Outcome::Inconclusive => self.inconclusive += 1,
        }
        self.checks.push(result);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnoseOptions {
    pub network: bool,
}

/// Check runner bound to one subject and one timing profile.
pub struct Diagnostics<'a> {
    subject: &'a Subject,
    limits: SessionLimits,
    startup: Duration,
    join_timeout: Duration,
    prompt: Regex,
}

impl<'a> Diagnostics<'a> {
    pub fn new(subject: &'a Subject, config: &DebugConfig) -> Result<Self> {
        let prompt = Regex::new(&config.prompt_pattern)
            .with_context(|| format!("compile prompt pattern {:?}", config.prompt_pattern))?;
        Ok(Self {
            subject,
            limits: SessionLimits {
                session_limit: config.timing.session_limit(),
            },
            startup: config.timing.startup(),
            join_timeout: config.timing.join_timeout(),
            prompt,
        })
    }

    pub fn run_check(&self, kind: CheckKind, reporter: &mut dyn Reporter) -> Result<CheckResult> {
        match kind {
            CheckKind::EchoSpecialChars => {
                let command = format!("echo {SPECIAL_CHARS}");
                let (result, stdout) = self.command_check(kind, &command, reporter)?;
                Ok(self.judge(kind, &result, contains_outcome(&stdout, SPECIAL_CHARS), || {
                    vec![
                        format!("Expected to contain: '{SPECIAL_CHARS}'"),
                        format!("Got: {}", preview(&stdout, PREVIEW_BYTES)),
                    ]
                }))
            }
            CheckKind::PipeVariables => {
                let (result, stdout) = self.command_check(kind, "x=5\nx=6 | echo $x\necho $x", reporter)?;
                Ok(self.judge(kind, &result, pipe_variables_outcome(&stdout), || {
                    vec![
                        "Variable assignment in pipe affected the parent shell".to_string(),
                        format!("Got: {}", preview(&stdout, PREVIEW_BYTES)),
                    ]
                }))
            }
            CheckKind::FailingPipeStage => {
                let (result, stdout) =
                    self.command_check(kind, "cat nonexistentfile | echo still_working", reporter)?;
                Ok(self.judge(kind, &result, contains_outcome(&stdout, "still_working"), || {
                    vec![
                        "Pipeline stopped after its first stage failed".to_string(),
                        format!("Output: {}", preview(&stdout, PREVIEW_BYTES)),
                        format!("Error: {}", preview(result.stderr.trim(), PREVIEW_BYTES)),
                    ]
                }))
            }
            CheckKind::BackgroundDone => {
                let result = Interaction::new(self.join_timeout)
                    .send("sleep 1 &")
                    .wait(Duration::from_secs(2))
                    .send("echo test")
                    .wait(Duration::from_millis(500))
                    .send("exit")
                    .run(self.subject, self.limits)?;
                let stdout = self.clean(&result.stdout);
                Ok(self.judge(kind, &result, contains_outcome(&stdout, BACKGROUND_DONE), || {
                    vec![
                        format!("Expected to contain: '{BACKGROUND_DONE}'"),
                        format!("Got: {}", preview(&stdout, PREVIEW_BYTES)),
                    ]
                }))
            }
            CheckKind::JobIdReset => {
                let result = Interaction::new(self.join_timeout)
                    .send("sleep 0.5 &")
                    .wait(Duration::from_millis(600))
                    .send("sleep 0.5 &")
                    .wait(Duration::from_millis(100))
                    .send("exit")
                    .run(self.subject, self.limits)?;
                let stdout = self.clean(&result.stdout);
                Ok(self.judge(kind, &result, job_reset_outcome(&stdout), || {
                    vec![
                        format!("Job ids seen: {:?}", job_ids(&stdout)),
                        format!("Got: {}", preview(&stdout, PREVIEW_BYTES)),
                    ]
                }))
            }
            CheckKind::SigintSurvival => {
                reporter.info(&format!("Testing: {}", kind.title()));
                reporter.detail(&format!("Sending SIGINT, then: echo {AFTER_SIGNAL}"));
                let result = Interaction::new(self.join_timeout)
                    .wait(self.startup)
                    .signal(libc::SIGINT)
                    .wait(Duration::from_millis(500))
                    .send(format!("echo {AFTER_SIGNAL}"))
                    .wait(Duration::from_millis(500))
                    .send("exit")
                    .run(self.subject, self.limits)?;
                let stdout = self.clean(&result.stdout);
                let input_closed = result.transcript.contains(&TranscriptEntry::InputClosed);
                Ok(self.judge(kind, &result, sigint_outcome(&stdout, input_closed), || {
                    let mut notes = Vec::new();
                    if input_closed {
                        notes.push("Shell exited on SIGINT instead of ignoring it".to_string());
                    } else {
                        notes.push(format!("Shell did not answer 'echo {AFTER_SIGNAL}' after SIGINT"));
                    }
                    notes.push(format!("Got: {}", preview(&stdout, PREVIEW_BYTES)));
                    notes
                }))
            }
            CheckKind::NetworkExchange => self.network_exchange(reporter),
        }
    }

    fn command_check(
        &self,
        kind: CheckKind,
        command: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<(InteractionResult, String)> {
        reporter.info(&format!("Testing: {}", kind.title()));
        reporter.detail(&format!("Command: {command}"));
        let result = Interaction::new(self.join_timeout)
            .send(command)
            .send("exit")
            .run(self.subject, self.limits)?;
        let stdout = self.clean(&result.stdout);
        Ok((result, stdout))
    }

    fn judge(
        &self,
        kind: CheckKind,
        result: &InteractionResult,
        outcome: Outcome,
        notes: impl FnOnce() -> Vec<String>,
    ) -> CheckResult {
        if result.verdict == Verdict::Inconclusive {
            return CheckResult {
                kind,
                outcome: Outcome::Inconclusive,
                notes: vec![format!(
                    "subject did not exit within {} ms",
                    self.join_timeout.as_millis()
                )],
            };
        }
        CheckResult {
            kind,
            outcome,
            notes: if outcome == Outcome::Pass { Vec::new() } else { notes() },
        }
    }

    fn network_exchange(&self, reporter: &mut dyn Reporter) -> Result<CheckResult> {
        let kind = CheckKind::NetworkExchange;
        let port = free_port()?;
        reporter.info(&format!("Using port {port} for testing"));

        let mut server = Session::spawn(self.subject, self.limits)?;
        server.send(&format!("start-server {port}"))?;
        let mut server_output = server.read_available(Duration::from_secs(1))?;

        let client = Interaction::new(self.join_timeout)
            .send(format!("send {port} 127.0.0.1 {NETWORK_MESSAGE}"))
            .wait(Duration::from_millis(500))
            .send("exit")
            .run(self.subject, self.limits)?;

        server_output.append(&server.read_available(Duration::from_millis(500))?);
        for line in ["close-server", "exit"] {
            if let Err(err) = server.send(line) {
                tracing::debug!(error = %err, line, "server stopped accepting input");
                break;
            }
            server_output.append(&server.read_available(Duration::from_millis(500))?);
        }
        let completion = server.communicate(self.join_timeout)?;
        server_output.append(&completion.output);

        let client_stdout = self.clean(&client.stdout);
        let server_stdout = self.clean(&server_output.stdout_text());
        let outcome = network_outcome(&client_stdout, &server_stdout);
        let outcome = match outcome {
            Outcome::Fail if client.verdict == Verdict::Inconclusive || completion.timed_out => {
                Outcome::Inconclusive
            }
            other => other,
        };
        let notes = if outcome == Outcome::Pass {
            Vec::new()
        } else {
            vec![
                format!("Client output: {}", preview(&client_stdout, PREVIEW_BYTES)),
                format!("Server output: {}", preview(&server_stdout, PREVIEW_BYTES)),
            ]
        };
        Ok(CheckResult { kind, outcome, notes })
    }

    fn clean(&self, text: &str) -> String {
        strip_prompt(&self.prompt, text)
    }
}

/// Run the standard checks (plus the network exchange when asked) and print
/// a summary.
pub fn run_diagnostics(
    subject: &Subject,
    config: &DebugConfig,
    options: DiagnoseOptions,
    reporter: &mut dyn Reporter,
) -> Result<DiagnoseSummary> {
    let diagnostics = Diagnostics::new(subject, config)?;
    reporter.header("Shell Diagnostic Tool");
    reporter.info(&format!("Subject: {}", subject.command()));

    let mut kinds = CheckKind::STANDARD.to_vec();
    if options.network {
        kinds.push(CheckKind::NetworkExchange);
    }

    let mut summary = DiagnoseSummary::default();
    let mut section = "";
    for kind in kinds {
        if section_title(kind) != section {
            section = section_title(kind);
            reporter.header(section);
        }
        let started = std::time::Instant::now();
        let result = match diagnostics.run_check(kind, reporter) {
            Ok(result) => result,
            Err(err) => CheckResult {
                kind,
                outcome: Outcome::Fail,
                notes: vec![format!("check failed with error: {err:#}")],
            },
        };
        tracing::info!(
            check = ?kind,
            outcome = ?result.outcome,
            elapsed_ms = started.elapsed().as_millis(),
            "diagnostic check finished"
        );
        report_result(&result, reporter);
        summary.push(result);
    }

    if options.network {
        print_manual_network_steps(reporter);
    }

    reporter.header("Diagnostic Complete");
    reporter.info(&format!(
        "{} passed, {} failed, {} inconclusive",
        summary.passed, summary.failed, summary.inconclusive
    ));
    reporter.info("Focus on failures and check the exact format expected by the tests.");
    Ok(summary)
}

fn section_title(kind: CheckKind) -> &'static str {
    match kind {
        CheckKind::EchoSpecialChars => "Testing echo with special characters",
        CheckKind::PipeVariables | CheckKind::FailingPipeStage => "Testing pipes with variables",
        CheckKind::BackgroundDone | CheckKind::JobIdReset => "Testing background processes",
        CheckKind::SigintSurvival => "Testing signal handling",
        CheckKind::NetworkExchange => "Testing network functionality",
    }
}

fn report_result(result: &CheckResult, reporter: &mut dyn Reporter) {
    let title = result.kind.title();
    match result.outcome {
        Outcome::Pass => reporter.success(&format!("{title}: passed")),
        Outcome::Fail => reporter.failure(&format!("{title}: failed")),
        Outcome::Inconclusive => reporter.info(&format!("{title}: inconclusive")),
    }
    for note in &result.notes {
        reporter.detail(note);
    }
}

fn print_manual_network_steps(reporter: &mut dyn Reporter) {
    reporter.header("Analyzing network message formatting");
    reporter.info("This check requires manual verification.");
    for step in [
        "1. Run the shell in two separate terminals",
        "2. In the first terminal: start-server 12345",
        "3. In the second terminal: start-client 12345 127.0.0.1",
        "4. In the client terminal, type: test_message",
        "5. Verify the message format in the server terminal",
        "6. Expected format: 'client#1: test_message'",
        "7. Close both shells when done",
    ] {
        reporter.detail(step);
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind a free local port")?;
    let port = listener.local_addr().context("read bound port")?.port();
    Ok(port)
}

/// Remove every prompt occurrence and surrounding whitespace.
pub fn strip_prompt(prompt: &Regex, text: &str) -> String {
    prompt.replace_all(text, "").trim().to_string()
}

pub fn contains_outcome(haystack: &str, needle: &str) -> Outcome {
    if haystack.contains(needle) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

/// `x=6` inside a pipeline runs in a child; the parent must still print 5.
pub fn pipe_variables_outcome(stdout: &str) -> Outcome {
    if stdout.contains('5') && !stdout.contains('6') {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

/// Ids of job launch notices (`[n] <pid>`), in output order.
pub fn job_ids(stdout: &str) -> Vec<u32> {
    static LAUNCH: OnceLock<Regex> = OnceLock::new();
    let launch = LAUNCH.get_or_init(|| Regex::new(r"^\[(\d+)\]\s+\d+$").expect("valid launch regex"));
    stdout
        .lines()
        .filter_map(|line| launch.captures(line.trim()))
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Two launches, the second after the first finished: it must reuse id 1.
pub fn job_reset_outcome(stdout: &str) -> Outcome {
    let ids = job_ids(stdout);
    if ids.len() >= 2 && ids.last() == Some(&1) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

/// The shell must still be reading commands after SIGINT.
pub fn sigint_outcome(stdout: &str, input_closed: bool) -> Outcome {
    if !input_closed && stdout.contains(AFTER_SIGNAL) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

pub fn network_outcome(client_stdout: &str, server_stdout: &str) -> Outcome {
    if client_stdout.contains(NETWORK_MESSAGE) || server_stdout.contains(NETWORK_MESSAGE) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

#[cfg(test)]
#[path = "diagnose_tests.rs"]
mod tests;
