//! `probe` and `diagnose` against a real shell standing in for the subject.

mod common;

use common::{has_program, shdebug, stderr, stdout};

#[test]
fn probe_reports_output_and_exit_code() {
    if !has_program("sh") {
        eprintln!("Skipping: sh not available");
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let output = shdebug(
        dir.path(),
        &["probe", "echo hello", "--subject", "sh", "--join-timeout-ms", "2000"],
    );
    assert!(output.status.success(), "probe failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Testing command: echo hello"), "{out}");
    assert!(out.contains("Command output: 'hello"), "{out}");
    assert!(out.contains("Exit code: 0"), "{out}");
}

#[test]
fn probe_runs_each_command_in_its_own_session() {
    if !has_program("sh") {
        eprintln!("Skipping: sh not available");
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let output = shdebug(
        dir.path(),
        &["probe", "x=1", "echo x=$x", "--subject", "sh"],
    );
    assert!(output.status.success(), "probe failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Command output: 'x="), "{out}");
    assert!(!out.contains("Command output: 'x=1"), "{out}");
}

#[test]
fn diagnose_without_subject_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = shdebug(dir.path(), &["diagnose", "--subject", "./mysh"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("compile the shell first"), "{err}");
}

#[test]
fn same_session_keeps_shell_state() {
    if !has_program("sh") {
        eprintln!("Skipping: sh not available");
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let output = shdebug(
        dir.path(),
        &["probe", "--same-session", "x=1", "echo x=$x", "--subject", "sh"],
    );
    assert!(output.status.success(), "probe failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Testing command: x=1; echo x=$x"), "{out}");
    assert!(out.contains("Command output: 'x=1"), "{out}");
    assert!(out.contains("Exit code: 0"), "{out}");
}
