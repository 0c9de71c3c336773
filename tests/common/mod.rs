//! Shared test infrastructure for integration tests.

use serde::Deserialize;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Test fixture metadata loaded from fixture.json.
#[derive(Debug, Deserialize)]
pub struct FixtureConfig {
    #[allow(dead_code)]
    pub description: String,
    #[serde(default)]
    pub expected_debug_functions: Vec<String>,
    #[serde(default)]
    pub expected_unmatched: Vec<String>,
}

/// A fixture directory copied into a scratch workspace.
pub struct TestFixture {
    pub config: FixtureConfig,
    pub workspace: TempDir,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

impl TestFixture {
    /// Load `tests/fixtures/<name>` and copy its files (minus fixture.json)
    /// into a fresh temp dir.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let fixture_dir = manifest_dir().join("tests/fixtures").join(name);
        let config_text = fs::read_to_string(fixture_dir.join("fixture.json"))?;
        let config: FixtureConfig = serde_json::from_str(&config_text)?;
        let workspace = TempDir::new()?;
        for entry in fs::read_dir(&fixture_dir)? {
            let path = entry?.path();
            if path.file_name().is_some_and(|n| n == "fixture.json") || !path.is_file() {
                continue;
            }
            if let Some(file_name) = path.file_name() {
                fs::copy(&path, workspace.path().join(file_name))?;
            }
        }
        Ok(Self { config, workspace })
    }

    pub fn path(&self) -> &Path {
        self.workspace.path()
    }

    /// Run shdebug inside the workspace.
    pub fn run(&self, args: &[&str]) -> Output {
        shdebug(self.path(), args)
    }

    /// Run the generated harness with `input` on stdin, if python3 exists.
    pub fn run_harness(&self, input: &str) -> Option<Output> {
        if !has_program("python3") {
            eprintln!("Skipping: python3 not available");
            return None;
        }
        let mut child = Command::new("python3")
            .arg("debug_tests.py")
            .current_dir(self.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn python3");
        child
            .stdin
            .take()
            .expect("harness stdin")
            .write_all(input.as_bytes())
            .expect("write harness input");
        Some(child.wait_with_output().expect("wait for harness"))
    }
}

/// Run the built binary with `cwd` as working directory and an isolated
/// user config dir.
pub fn shdebug(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shdebug"))
        .args(args)
        .current_dir(cwd)
        .env("XDG_CONFIG_HOME", cwd.join(".config"))
        .env_remove("SHDEBUG_LOG")
        .output()
        .expect("run shdebug")
}

pub fn has_program(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
