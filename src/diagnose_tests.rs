use super::*;
use crate::reporter::{Level, MemoryReporter};

fn prompt() -> Regex {
    Regex::new(&DebugConfig::default().prompt_pattern).unwrap()
}

fn sh_subject() -> Option<Subject> {
    Subject::parse("sh", None).ok()
}

#[test]
fn strip_prompt_removes_every_prompt() {
    let text = "mysh$ hello\nmysh$ world\nmysh$ ";
    assert_eq!(strip_prompt(&prompt(), text), "hello\nworld");
    assert_eq!(strip_prompt(&prompt(), "mysh$    "), "");
}

#[test]
fn pipe_variables_requires_parent_value() {
    assert_eq!(pipe_variables_outcome("5\n5"), Outcome::Pass);
    assert_eq!(pipe_variables_outcome("6\n5"), Outcome::Fail);
    assert_eq!(pipe_variables_outcome("6\n6"), Outcome::Fail);
    assert_eq!(pipe_variables_outcome(""), Outcome::Fail);
}

#[test]
fn job_ids_reads_launch_notices_only() {
    let stdout = "[1] 1234\n[1]+ Done sleep 0.5\n[2] 1240\n";
    assert_eq!(job_ids(stdout), vec![1, 2]);
    assert_eq!(job_reset_outcome(stdout), Outcome::Fail);

    let reset = "[1] 1234\n[1]+ Done sleep 0.5\n  [1] 1240  \n";
    assert_eq!(job_ids(reset), vec![1, 1]);
    assert_eq!(job_reset_outcome(reset), Outcome::Pass);

    assert_eq!(job_reset_outcome("[1] 1234\n"), Outcome::Fail);
}

#[test]
fn contains_and_network_outcomes() {
    assert_eq!(
        contains_outcome(&format!("{SPECIAL_CHARS}\n"), SPECIAL_CHARS),
        Outcome::Pass
    );
    assert_eq!(contains_outcome("[1]+ Done sleep 2", BACKGROUND_DONE), Outcome::Fail);
    assert_eq!(network_outcome("", "client#1: test_message"), Outcome::Pass);
    assert_eq!(network_outcome("sent", "listening"), Outcome::Fail);
}

#[test]
fn pipe_checks_pass_against_posix_sh() {
    let Some(sh) = sh_subject() else {
        return;
    };
    let config = DebugConfig::default();
    let diagnostics = Diagnostics::new(&sh, &config).unwrap();
    let mut reporter = MemoryReporter::default();

    let result = diagnostics
        .run_check(CheckKind::PipeVariables, &mut reporter)
        .unwrap();
    assert_eq!(result.outcome, Outcome::Pass, "{:?}", result.notes);

    let result = diagnostics
        .run_check(CheckKind::FailingPipeStage, &mut reporter)
        .unwrap();
    assert_eq!(result.outcome, Outcome::Pass, "{:?}", result.notes);
    assert!(reporter.contains(Level::Detail, "Command: cat nonexistentfile | echo still_working"));
}

#[test]
fn failed_check_carries_notes() {
    let Some(sh) = sh_subject() else {
        return;
    };
    let config = DebugConfig::default();
    let diagnostics = Diagnostics::new(&sh, &config).unwrap();
    let mut reporter = MemoryReporter::default();
    let result = diagnostics
        .run_check(CheckKind::EchoSpecialChars, &mut reporter)
        .unwrap();
    assert_eq!(result.outcome, Outcome::Fail);
    assert!(result.notes[0].starts_with("Expected to contain:"));
}

#[test]
fn sigint_outcome_requires_a_live_shell() {
    assert_eq!(sigint_outcome("after_signal", false), Outcome::Pass);
    assert_eq!(sigint_outcome("", false), Outcome::Fail);
    assert_eq!(sigint_outcome("after_signal", true), Outcome::Fail);
}

#[test]
fn shell_ignoring_sigint_passes_signal_check() {
    let Ok(shell) = Subject::parse("sh -c \"trap '' INT; exec sh\"", None) else {
        return;
    };
    let config = DebugConfig::default();
    let diagnostics = Diagnostics::new(&shell, &config).unwrap();
    let mut reporter = MemoryReporter::default();
    let result = diagnostics
        .run_check(CheckKind::SigintSurvival, &mut reporter)
        .unwrap();
    assert_eq!(result.outcome, Outcome::Pass, "{:?}", result.notes);
    assert!(reporter.contains(Level::Detail, "Sending SIGINT"));
}

#[test]
fn full_run_summarizes_counts() {
    let Some(sh) = sh_subject() else {
        return;
    };
    let config = DebugConfig::default();
    let mut reporter = MemoryReporter::default();
    let summary = run_diagnostics(&sh, &config, DiagnoseOptions::default(), &mut reporter).unwrap();
    assert_eq!(summary.checks.len(), CheckKind::STANDARD.len());
    assert_eq!(
        summary.passed + summary.failed + summary.inconclusive,
        CheckKind::STANDARD.len()
    );
    let outcome = |kind: CheckKind| {
        summary
            .checks
            .iter()
            .find(|check| check.kind == kind)
            .map(|check| check.outcome)
    };
    assert_eq!(outcome(CheckKind::PipeVariables), Some(Outcome::Pass));
    assert_eq!(outcome(CheckKind::FailingPipeStage), Some(Outcome::Pass));
    assert_eq!(outcome(CheckKind::EchoSpecialChars), Some(Outcome::Fail));
    assert!(reporter.contains(Level::Header, "Testing signal handling"));
    assert!(reporter.contains(Level::Header, "Diagnostic Complete"));
    assert!(reporter.contains(
        Level::Info,
        &format!(
            "{} passed, {} failed, {} inconclusive",
            summary.passed, summary.failed, summary.inconclusive
        )
    ));
    assert_eq!(
        reporter.count(Level::Success) + reporter.count(Level::Failure),
        summary.passed + summary.failed
    );
}
