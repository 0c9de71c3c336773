//! Pairing failure records with test implementations.
//!
//! Matching is by normalized name only: exact key first, then substring
//! anchored at the test prefix, first hit in catalog order wins. There is no scoring; when two
//! implementations could match, catalog order decides, so the same inputs
//! always produce the same pairs.
use crate::catalog::FunctionEntry;
use crate::report::TestRecord;
use serde::Serialize;

const HISTORICAL_PREFIX: &str = "_test_";

/// A failing record and the implementation it was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatedPair {
    pub record: TestRecord,
    pub entry: FunctionEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Correlation {
    /// In record order.
    pub pairs: Vec<CorrelatedPair>,
    pub unmatched: Vec<TestRecord>,
}

/// Normalize a report test name into the key used for matching.
///
/// `Pipe Variables` becomes `pipe_variables`. The `v_ -> v` rewrite is a
/// naming quirk of the suite and is applied as-is. Both rewrites run to a
/// fixpoint so the key is stable under re-normalization.
pub fn canonical_key(name: &str) -> String {
    let mut key: String = name
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                ch
            } else {
                '_'
            }
        })
        .collect();
    while let Some(rest) = key.strip_prefix(HISTORICAL_PREFIX) {
        key = rest.to_string();
    }
    while key.contains("v_") {
        key = key.replace("v_", "v");
    }
    key
}

/// Matching key for an implementation name: lower-cased, test prefix removed.
pub fn entry_key(qualified_name: &str, test_prefix: &str) -> String {
    let lowered = qualified_name.to_lowercase();
    let prefix = test_prefix.to_lowercase();
    match lowered.strip_prefix(&prefix) {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Map each record to at most one unclaimed entry.
pub fn correlate(
    records: &[TestRecord],
    entries: &[FunctionEntry],
    test_prefix: &str,
) -> Correlation {
    let keys: Vec<String> = entries
        .iter()
        .map(|entry| entry_key(&entry.qualified_name, test_prefix))
        .collect();
    let names: Vec<String> = entries
        .iter()
        .map(|entry| entry.qualified_name.to_lowercase())
        .collect();
    let prefix = test_prefix.to_lowercase();
    let mut claimed = vec![false; entries.len()];
    let mut correlation = Correlation::default();

    for record in records {
        let key = canonical_key(&record.name);
        let hit = if key.is_empty() {
            None
        } else {
            let open = |idx: &usize| !claimed[*idx];
            let anchored = format!("{prefix}{key}");
            (0..entries.len())
                .filter(open)
                .find(|idx| keys[*idx] == key)
                .or_else(|| {
                    (0..entries.len())
                        .filter(open)
                        .find(|idx| names[*idx].contains(&anchored))
                })
        };
        match hit {
            Some(idx) => {
                claimed[idx] = true;
                tracing::debug!(
                    suite = %record.suite,
                    test = %record.name,
                    function = %entries[idx].qualified_name,
                    module = %entries[idx].defining_module,
                    "correlated"
                );
                correlation.pairs.push(CorrelatedPair {
                    record: record.clone(),
                    entry: entries[idx].clone(),
                });
            }
            None => {
                tracing::debug!(suite = %record.suite, test = %record.name, key = %key, "no implementation");
                correlation.unmatched.push(record.clone());
            }
        }
    }
    correlation
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str) -> TestRecord {
        TestRecord {
            suite: "Suite".to_string(),
            name: name.to_string(),
            status: "NOT OK".to_string(),
        }
    }

    fn entry(module: &str, name: &str) -> FunctionEntry {
        FunctionEntry {
            qualified_name: name.to_string(),
            defining_module: module.to_string(),
            path: PathBuf::from(format!("{module}.py")),
            source_text: format!("def {name}():\n    pass\n"),
        }
    }

    #[test]
    fn canonical_key_normalizes_names() {
        assert_eq!(canonical_key("Pipe Variables"), "pipe_variables");
        assert_eq!(canonical_key("Echo: @special!"), "echo___special_");
        assert_eq!(canonical_key("_test_ls basic"), "ls_basic");
        assert_eq!(canonical_key("Env Var"), "envvar");
        assert_eq!(canonical_key("Nav_ X"), "navx");
        assert_eq!(canonical_key("Über 2"), "_ber_2");
    }

    #[test]
    fn canonical_key_is_idempotent() {
        for name in [
            "Pipe Variables",
            "Env  Var",
            "v__v__x",
            "_test__test_x",
            "Background Job v_2",
            "  ",
            "",
            "TEST_Thing",
        ] {
            let once = canonical_key(name);
            assert_eq!(canonical_key(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn entry_key_strips_test_prefix() {
        assert_eq!(entry_key("_test_pipe_variables", "_test_"), "pipe_variables");
        assert_eq!(entry_key("helper", "_test_"), "helper");
    }

    #[test]
    fn pipe_variables_matches_exactly() {
        let entries = vec![
            entry("tests_pipes", "_test_pipe_variables_extra"),
            entry("tests_pipes", "_test_pipe_variables"),
        ];
        let records = vec![TestRecord {
            suite: "Pipes".to_string(),
            name: "Pipe Variables".to_string(),
            status: "NOT OK (TIMEOUT)".to_string(),
        }];
        let correlation = correlate(&records, &entries, "_test_");
        assert_eq!(correlation.pairs.len(), 1);
        assert_eq!(correlation.pairs[0].entry.qualified_name, "_test_pipe_variables");
        assert!(correlation.unmatched.is_empty());
    }

    #[test]
    fn substring_match_takes_first_in_catalog_order() {
        let entries = vec![
            entry("tests_a", "_test_echo_basic_spaces"),
            entry("tests_b", "_test_echo_basic_quotes"),
        ];
        let correlation = correlate(&[record("Echo Basic")], &entries, "_test_");
        assert_eq!(correlation.pairs[0].entry.defining_module, "tests_a");
    }

    #[test]
    fn substring_match_is_anchored_at_test_prefix() {
        let entries = vec![entry("tests_pipes", "_test_pipe_echo")];
        let correlation = correlate(&[record("Echo")], &entries, "_test_");
        assert!(correlation.pairs.is_empty());
        assert_eq!(correlation.unmatched, vec![record("Echo")]);

        let entries = vec![
            entry("tests_pipes", "_test_pipe_echo"),
            entry("tests_echo", "_test_echo_quotes"),
        ];
        let correlation = correlate(&[record("Echo")], &entries, "_test_");
        assert_eq!(correlation.pairs[0].entry.qualified_name, "_test_echo_quotes");
    }

    #[test]
    fn claimed_entries_are_not_reused() {
        let entries = vec![entry("tests_a", "_test_echo_basic")];
        let records = vec![record("Echo Basic"), record("Echo")];
        let correlation = correlate(&records, &entries, "_test_");
        assert_eq!(correlation.pairs.len(), 1);
        assert_eq!(correlation.pairs[0].record.name, "Echo Basic");
        assert_eq!(correlation.unmatched, vec![record("Echo")]);
    }

    #[test]
    fn unmatched_records_are_counted() {
        let entries = vec![entry("tests_a", "_test_pipe_variables")];
        let records = vec![record("Pipe Variables"), record("Signals Ignored")];
        let correlation = correlate(&records, &entries, "_test_");
        assert_eq!(correlation.pairs.len(), 1);
        assert_eq!(correlation.unmatched.len(), 1);
        assert_eq!(correlation.unmatched[0].name, "Signals Ignored");
    }

    #[test]
    fn empty_key_never_matches() {
        let entries = vec![entry("tests_a", "_test_anything")];
        let correlation = correlate(&[record("!!")], &[], "_test_");
        assert_eq!(correlation.unmatched.len(), 1);
        let correlation = correlate(&[record("")], &entries, "_test_");
        assert!(correlation.pairs.is_empty());
    }

    #[test]
    fn correlation_is_deterministic() {
        let entries = vec![
            entry("tests_a", "_test_cd_home"),
            entry("tests_a", "_test_cd_home_twice"),
            entry("tests_b", "_test_cd_home"),
            entry("tests_b", "_test_ls"),
        ];
        let records = vec![record("cd home"), record("cd home"), record("ls"), record("cd")];
        let first = correlate(&records, &entries, "_test_");
        let second = correlate(&records, &entries, "_test_");
        assert_eq!(first, second);
        let picked: Vec<(&str, &str)> = first
            .pairs
            .iter()
            .map(|p| (p.entry.defining_module.as_str(), p.entry.qualified_name.as_str()))
            .collect();
        assert_eq!(
            picked,
            vec![
                ("tests_a", "_test_cd_home"),
                ("tests_b", "_test_cd_home"),
                ("tests_b", "_test_ls"),
                ("tests_a", "_test_cd_home_twice"),
            ]
        );
    }
}
