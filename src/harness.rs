//! Debug harness assembly.
//!
//! The harness is one Python script: a fixed preamble defining the logging
//! wrappers, every instrumented function in correlation order, an explicit
//! `DEBUG_TESTS` registry written here, and a fixed menu runner that only
//! iterates that registry. The script takes no arguments.
use crate::config::DebugConfig;
use crate::instrument::InstrumentedFunction;
use crate::templates::{HARNESS_PREAMBLE_PY, HARNESS_RUNNER_PY};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const REGISTRY_NAME: &str = "DEBUG_TESTS";

/// Values baked into the preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSettings {
    pub helpers_module: String,
    pub debug_dir: String,
    pub results_file: String,
    pub student_dir: String,
    pub settle: Duration,
    pub drain: Duration,
    /// Shown in the header comment only.
    pub report_label: String,
}

impl HarnessSettings {
    pub fn from_config(config: &DebugConfig, report_label: &str) -> Self {
        Self {
            helpers_module: config.sources.helpers_module.clone(),
            debug_dir: config.harness.debug_dir.clone(),
            results_file: config.harness.results_file.clone(),
            student_dir: config.harness.student_dir.clone(),
            settle: config.timing.settle(),
            drain: config.timing.drain(),
            report_label: report_label.to_string(),
        }
    }
}

/// Render the full harness script.
pub fn emit(functions: &[InstrumentedFunction], settings: &HarnessSettings) -> String {
    let mut out = render_preamble(settings);

    for function in functions {
        out.push_str(&function_block(function));
    }

    out.push_str("\n\n# Registry of instrumented tests, in correlation order\n");
    out.push_str(REGISTRY_NAME);
    out.push_str(" = [\n");
    for function in functions {
        out.push_str(&format!(
            "    ({}, {}),\n",
            py_string(&function.debug_name),
            function.debug_name
        ));
    }
    out.push_str("]\n\n\n");
    out.push_str(HARNESS_RUNNER_PY);
    out
}

/// Write the harness and mark it executable.
pub fn write_artifact(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

fn render_preamble(settings: &HarnessSettings) -> String {
    HARNESS_PREAMBLE_PY
        .replace("{{REPORT}}", &single_line(&settings.report_label))
        .replace("{{HELPERS_MODULE}}", &settings.helpers_module)
        .replace("{{DEBUG_DIR}}", &py_string(&settings.debug_dir))
        .replace("{{RESULTS_FILE}}", &py_string(&settings.results_file))
        .replace("{{STUDENT_DIR}}", &py_string(&settings.student_dir))
        .replace("{{SETTLE_SECONDS}}", &seconds(settings.settle))
        .replace("{{DRAIN_SECONDS}}", &seconds(settings.drain))
}

fn function_block(function: &InstrumentedFunction) -> String {
    let rule = format!("# {}", "-".repeat(70));
    let mut block = String::new();
    block.push_str("\n\n");
    block.push_str(&rule);
    block.push('\n');
    block.push_str(&format!("# Test: {}\n", single_line(&function.record.name)));
    block.push_str(&format!("# Suite: {}\n", single_line(&function.record.suite)));
    block.push_str(&format!("# Status: {}\n", single_line(&function.record.status)));
    block.push_str(&format!(
        "# Original function: {} in {}\n",
        function.origin_name, function.origin_module
    ));
    block.push_str(&rule);
    block.push('\n');
    block.push_str(&function.source_text);
    if !function.source_text.ends_with('\n') {
        block.push('\n');
    }
    block
}

/// JSON string syntax is a valid Python string literal.
fn py_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}
