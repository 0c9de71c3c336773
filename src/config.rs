//! Tool configuration.
//!
//! Config is a small JSON document; every field has a default so an empty
//! object (or no file at all) is valid. Lookup order is an explicit
//! `--config` path, then `shdebug.json` in the working directory, then
//! `shdebug/config.json` under the user config dir.
use crate::errors::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "shdebug.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    pub schema_version: u32,
    /// Subject command line, split with shell-words.
    pub subject: String,
    /// Regex matching the subject's prompt, stripped before output checks.
    pub prompt_pattern: String,
    pub report: ReportConfig,
    pub sources: SourceConfig,
    pub harness: HarnessConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub prefix: String,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub file_prefix: String,
    pub file_suffix: String,
    /// Identifier prefix marking a test implementation.
    pub test_prefix: String,
    /// Module the emitted harness imports the suite helpers from.
    pub helpers_module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub output: PathBuf,
    pub debug_prefix: String,
    pub debug_dir: String,
    pub results_file: String,
    pub student_dir: String,
}

/// Wait windows used when talking to the subject.
///
/// These are heuristics: the subject protocol has no completion signal, so
/// a window only bounds how long we wait before assuming output has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Delay after each write before draining output.
    pub settle_ms: u64,
    /// How long the harness keeps draining output after the settle delay.
    pub drain_ms: u64,
    /// Wait for the initial prompt after spawning.
    pub startup_ms: u64,
    /// Read window used after a probe command.
    pub command_window_ms: u64,
    /// Overall bound on the final join.
    pub join_timeout_ms: u64,
    /// Hard cap on the lifetime of one session.
    pub session_limit_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            subject: "./mysh".to_string(),
            prompt_pattern: r"mysh\$\s*".to_string(),
            report: ReportConfig::default(),
            sources: SourceConfig::default(),
            harness: HarnessConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            prefix: "FEEDBACK".to_string(),
            suffix: ".txt".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            file_prefix: "tests_".to_string(),
            file_suffix: ".py".to_string(),
            test_prefix: "_test_".to_string(),
            helpers_module: "tests_helpers".to_string(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("debug_tests.py"),
            debug_prefix: "debug_".to_string(),
            debug_dir: "debug_output".to_string(),
            results_file: "debug_results.txt".to_string(),
            student_dir: ".".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            drain_ms: 100,
            startup_ms: 200,
            command_window_ms: 2_000,
            join_timeout_ms: 3_000,
            session_limit_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }

    pub fn command_window(&self) -> Duration {
        Duration::from_millis(self.command_window_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn session_limit(&self) -> Duration {
        Duration::from_millis(self.session_limit_ms)
    }
}

impl ReportConfig {
    pub fn pattern(&self) -> String {
        format!("{}*{}", self.prefix, self.suffix)
    }
}

impl SourceConfig {
    pub fn pattern(&self) -> String {
        format!("{}*{}", self.file_prefix, self.file_suffix)
    }
}

/// Resolve and load the config, falling back to defaults when no file exists.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<DebugConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config_path(cwd),
    };
    let config = match path {
        Some(path) => {
            let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
            let config: DebugConfig = serde_json::from_slice(&bytes)
                .with_context(|| format!("parse config JSON {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => DebugConfig::default(),
    };
    validate_config(&config)?;
    Ok(config)
}

fn discover_config_path(cwd: &Path) -> Option<PathBuf> {
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("shdebug").join("config.json");
    user.is_file().then_some(user)
}

/// Reject configs that would make the pipeline or the driver misbehave.
pub fn validate_config(config: &DebugConfig) -> Result<(), ConfigError> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::Invalid(format!(
            "unsupported schema_version {}",
            config.schema_version
        )));
    }
    if config.subject.trim().is_empty() {
        return Err(ConfigError::Invalid("subject is empty".to_string()));
    }
    if regex::Regex::new(&config.prompt_pattern).is_err() {
        return Err(ConfigError::Invalid(format!(
            "prompt_pattern {:?} is not a valid regex",
            config.prompt_pattern
        )));
    }
    for (label, value) in [
        ("sources.test_prefix", &config.sources.test_prefix),
        ("sources.helpers_module", &config.sources.helpers_module),
        ("harness.debug_prefix", &config.harness.debug_prefix),
    ] {
        if !is_identifier(value) {
            return Err(ConfigError::Invalid(format!(
                "{label} {value:?} is not a valid identifier"
            )));
        }
    }
    if config.sources.test_prefix == config.harness.debug_prefix {
        return Err(ConfigError::Invalid(
            "harness.debug_prefix must differ from sources.test_prefix".to_string(),
        ));
    }
    if config.timing.join_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "timing.join_timeout_ms must be positive".to_string(),
        ));
    }
    if config.timing.session_limit_ms < config.timing.join_timeout_ms {
        return Err(ConfigError::Invalid(
            "timing.session_limit_ms must be at least timing.join_timeout_ms".to_string(),
        ));
    }
    Ok(())
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}
