//! Failure report parsing.
//!
//! The report is written by an independent grading run, so parsing is
//! tolerant: a suite block is a header line ending in `:`, one or more lines
//! indented by two spaces, and a `Result:PASS|FAIL` terminator. Anything that
//! does not fit abandons the open block without an error. Only FAIL blocks
//! are scanned for entries.
//!
//! ```text
//! Pipes:
//!   18-October-2025 10:00:01----Pipe Variables:NOT OK (TIMEOUT)
//!   18-October-2025 10:00:02----Simple Pipe:OK
//! Result:FAIL
//! ```
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const OK_STATUS: &str = "OK";

/// One failing test named by the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestRecord {
    pub suite: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuiteResult {
    Pass,
    Fail,
}

fn entry_regex() -> &'static Regex {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    ENTRY.get_or_init(|| Regex::new(r"^  .*?----([^:]*):(.*)$").expect("valid entry regex"))
}

fn result_regex() -> &'static Regex {
    static RESULT: OnceLock<Regex> = OnceLock::new();
    RESULT.get_or_init(|| Regex::new(r"^Result:(PASS|FAIL)$").expect("valid result regex"))
}

/// Extract every non-OK entry from the FAIL blocks of `report_text`.
pub fn parse(report_text: &str) -> Vec<TestRecord> {
    let mut records = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for raw in report_text.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.starts_with("  ") {
            if let Some((_, body)) = open.as_mut() {
                body.push(line);
            }
            continue;
        }

        if let Some(result) = parse_result_line(line) {
            if let Some((suite, body)) = open.take() {
                if result == SuiteResult::Fail && !body.is_empty() {
                    records.extend(failing_entries(&suite, &body));
                }
            }
            continue;
        }

        open = line
            .strip_suffix(':')
            .map(|suite| (suite.trim().to_string(), Vec::new()));
        // A header with no body yet is replaced by the next header; a
        // header that already has a body is abandoned the same way.
    }

    tracing::debug!(records = records.len(), "parsed report");
    records
}

fn parse_result_line(line: &str) -> Option<SuiteResult> {
    let caps = result_regex().captures(line.trim_end())?;
    match &caps[1] {
        "PASS" => Some(SuiteResult::Pass),
        _ => Some(SuiteResult::Fail),
    }
}

fn failing_entries(suite: &str, body: &[&str]) -> Vec<TestRecord> {
    body.iter()
        .filter_map(|line| entry_regex().captures(line))
        .filter_map(|caps| {
            let name = caps[1].to_string();
            let status = caps[2].trim().to_string();
            (status != OK_STATUS).then(|| TestRecord {
                suite: suite.to_string(),
                name,
                status,
            })
        })
        .collect()
}

/// Count failing records per status, e.g. `NOT OK (TIMEOUT)`.
pub fn failure_breakdown(records: &[TestRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.status.clone()).or_insert(0) += 1;
    }
    counts
}
