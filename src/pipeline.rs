//! The `generate` pipeline: report to harness artifact.
//!
//! Stages run strictly in order and each returns a new value:
//! resolve report, parse, discover sources, correlate, instrument, emit,
//! write. A missing report or an empty source set stops the run before
//! anything is written; unmatched records and rejected functions are
//! carried into the summary instead.
use crate::catalog;
use crate::config::{DebugConfig, ReportConfig};
use crate::correlate;
use crate::errors::ConfigError;
use crate::harness::{self, HarnessSettings};
use crate::instrument::{self, InstrumentRules, Rejection};
use crate::report::{self, TestRecord};
use crate::reporter::Reporter;
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TIMEOUT_MARKER: &str = "TIMEOUT";

/// Inputs for one pipeline run.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    /// Directory searched for the report and the test sources.
    pub dir: &'a Path,
    pub report: Option<&'a Path>,
    /// Artifact path; relative paths land under `dir`.
    pub out: &'a Path,
    pub config: &'a DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedTest {
    pub debug_name: String,
    pub suite: String,
    pub test: String,
    pub status: String,
    pub origin_module: String,
    pub origin_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateSummary {
    pub report: PathBuf,
    pub failing: usize,
    pub failure_types: BTreeMap<String, usize>,
    pub sources: Vec<PathBuf>,
    pub matched: Vec<MatchedTest>,
    pub unmatched: Vec<TestRecord>,
    pub rejected: Vec<Rejection>,
    pub artifact: PathBuf,
    pub timeout_hint: bool,
}

/// Pick the report: the explicit path, else the first matching file in `dir`.
pub fn resolve_report(
    dir: &Path,
    explicit: Option<&Path>,
    config: &ReportConfig,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::ReportMissing(path.to_path_buf()));
        }
        return Ok(path.to_path_buf());
    }
    let candidates = catalog::find_test_sources(dir, &config.prefix, &config.suffix)
        .map_err(|err| ConfigError::Invalid(format!("{err:#}")))?;
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::ReportNotFound {
            dir: dir.to_path_buf(),
            pattern: config.pattern(),
        })
}

pub fn generate(request: &GenerateRequest<'_>) -> Result<GenerateSummary> {
    let config = request.config;
    let report_path = resolve_report(request.dir, request.report, &config.report)?;
    let report_text = fs::read_to_string(&report_path)
        .with_context(|| format!("read report {}", report_path.display()))?;
    let records = report::parse(&report_text);
    let failure_types = report::failure_breakdown(&records);
    tracing::info!(
        report = %report_path.display(),
        failing = records.len(),
        "parsed report"
    );

    let sources = catalog::find_test_sources(
        request.dir,
        &config.sources.file_prefix,
        &config.sources.file_suffix,
    )?;
    if sources.is_empty() {
        return Err(ConfigError::NoTestSources {
            dir: request.dir.to_path_buf(),
            pattern: config.sources.pattern(),
        }
        .into());
    }
    let entries = catalog::discover(&sources, &config.sources.test_prefix)?;

    let correlation = correlate::correlate(&records, &entries, &config.sources.test_prefix);
    let rules = InstrumentRules {
        test_prefix: config.sources.test_prefix.clone(),
        debug_prefix: config.harness.debug_prefix.clone(),
    };
    let batch = instrument::instrument_all(&correlation.pairs, &rules);

    let report_label = report_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| report_path.display().to_string());
    let settings = HarnessSettings::from_config(config, &report_label);
    let text = harness::emit(&batch.functions, &settings);
    let artifact = request.dir.join(request.out);
    harness::write_artifact(&artifact, &text)?;
    tracing::info!(
        artifact = %artifact.display(),
        functions = batch.functions.len(),
        unmatched = correlation.unmatched.len(),
        rejected = batch.rejected.len(),
        "wrote debug harness"
    );

    let timeout_hint = records.iter().any(|record| record.status.contains(TIMEOUT_MARKER));
    let matched = batch
        .functions
        .iter()
        .map(|function| MatchedTest {
            debug_name: function.debug_name.clone(),
            suite: function.record.suite.clone(),
            test: function.record.name.clone(),
            status: function.record.status.clone(),
            origin_module: function.origin_module.clone(),
            origin_name: function.origin_name.clone(),
        })
        .collect();

    Ok(GenerateSummary {
        report: report_path,
        failing: records.len(),
        failure_types,
        sources,
        matched,
        unmatched: correlation.unmatched,
        rejected: batch.rejected,
        artifact,
        timeout_hint,
    })
}

/// Human-readable summary; paths are shown relative to `base` when possible.
pub fn print_summary(summary: &GenerateSummary, base: &Path, reporter: &mut dyn Reporter) {
    reporter.header("Debug harness generated");
    reporter.info(&format!(
        "Report: {}",
        display_path(&summary.report, Some(base))
    ));
    reporter.info(&format!("Found {} failing tests", summary.failing));
    if !summary.failure_types.is_empty() {
        reporter.info("Failure types:");
        for (status, count) in &summary.failure_types {
            reporter.detail(&format!("{status}: {count}"));
        }
    }

    if summary.matched.is_empty() {
        reporter.failure("No failing tests could be instrumented");
    } else {
        reporter.success(&format!(
            "Created debug versions of {} tests:",
            summary.matched.len()
        ));
        for test in &summary.matched {
            reporter.detail(&format!("{} - {}: {}", test.debug_name, test.suite, test.test));
        }
    }

    if !summary.unmatched.is_empty() {
        reporter.failure(&format!(
            "Could not find implementations for {} tests",
            summary.unmatched.len()
        ));
        for record in &summary.unmatched {
            reporter.detail(&format!("{}: {}", record.suite, record.name));
        }
    }

    if !summary.rejected.is_empty() {
        reporter.failure(&format!(
            "Skipped {} tests that could not be instrumented safely",
            summary.rejected.len()
        ));
        for rejection in &summary.rejected {
            reporter.detail(&format!(
                "{} in {}: {}",
                rejection.origin_name, rejection.origin_module, rejection.reason
            ));
        }
    }

    let artifact = display_path(&summary.artifact, Some(base));
    reporter.info("To use the debug harness:");
    reporter.detail(&format!("1. Copy {artifact} next to your tests_helpers.py"));
    reporter.detail(&format!("2. Run: python3 {artifact}"));
    reporter.detail("3. Pick a test number, or 'all'");
    reporter.detail("4. Inspect the debug_output directory for detailed logs");

    if summary.timeout_hint {
        reporter.info("Some tests failed with TIMEOUT:");
        reporter.detail("The shell is probably waiting for input or never finishing a command.");
        reporter.detail("Check for unclosed pipe ends and children that are never reaped.");
    }
}
