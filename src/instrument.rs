//! Rewriting matched implementations into debug functions.
//!
//! Two substitutions, both on whole tokens found by the lexer:
//! the defining identifier `_test_<rest>` becomes `debug_<rest>`, and every
//! direct call to a suite I/O primitive is redirected to its logging
//! wrapper. Any other use of a primitive name (passing it around, shadowing
//! it, importing it) could let I/O escape the wrapper, so instrumentation
//! stops with an error instead of guessing.
use crate::correlate::CorrelatedPair;
use crate::errors::InstrumentError;
use crate::pysource::{self, Token, TokenKind};
use crate::report::TestRecord;
use serde::Serialize;
use std::collections::BTreeSet;

/// The suite's write primitives and the wrappers the preamble defines.
pub const IO_PRIMITIVES: &[(&str, &str)] = &[
    ("write", "debug_write"),
    ("write_no_stdout_flush", "debug_write_no_stdout_flush"),
];

/// Other names the harness preamble defines at top level.
const PREAMBLE_HELPERS: &[&str] = &["debug_print", "debug_read_available"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentRules {
    pub test_prefix: String,
    pub debug_prefix: String,
}

impl Default for InstrumentRules {
    fn default() -> Self {
        Self {
            test_prefix: "_test_".to_string(),
            debug_prefix: "debug_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedFunction {
    pub debug_name: String,
    #[serde(skip)]
    pub source_text: String,
    pub record: TestRecord,
    pub origin_module: String,
    pub origin_name: String,
    pub rewritten_calls: usize,
}

/// A matched implementation that could not be instrumented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub record: TestRecord,
    pub origin_module: String,
    pub origin_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentBatch {
    pub functions: Vec<InstrumentedFunction>,
    pub rejected: Vec<Rejection>,
}

/// Debug name for an implementation: the test prefix swapped for the debug prefix.
pub fn debug_name(qualified_name: &str, rules: &InstrumentRules) -> Result<String, InstrumentError> {
    let rest = qualified_name
        .strip_prefix(&rules.test_prefix)
        .ok_or_else(|| InstrumentError::UnexpectedName {
            name: qualified_name.to_string(),
            prefix: rules.test_prefix.clone(),
        })?;
    Ok(format!("{}{rest}", rules.debug_prefix))
}

/// Instrument one pair under its default debug name.
pub fn instrument(
    pair: &CorrelatedPair,
    rules: &InstrumentRules,
) -> Result<InstrumentedFunction, InstrumentError> {
    let name = debug_name(&pair.entry.qualified_name, rules)?;
    instrument_as(pair, &name)
}

/// Instrument one pair, naming the result `new_name`.
pub fn instrument_as(
    pair: &CorrelatedPair,
    new_name: &str,
) -> Result<InstrumentedFunction, InstrumentError> {
    let source = &pair.entry.source_text;
    let original = &pair.entry.qualified_name;
    let tokens = pysource::lex(source);

    let def_name = find_definition(source, &tokens, original).ok_or_else(|| {
        InstrumentError::MissingDefinition {
            name: original.clone(),
        }
    })?;

    let mut edits: Vec<(usize, usize, &str)> = vec![(def_name.start, def_name.end, new_name)];
    for (idx, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Name {
            continue;
        }
        let Some(wrapper) = wrapper_for(token.text(source)) else {
            continue;
        };
        match classify(source, &tokens, idx) {
            Use::Attribute => {}
            Use::Call => edits.push((token.start, token.end, wrapper)),
            Use::Other => {
                return Err(InstrumentError::AmbiguousReference {
                    token: token.text(source).to_string(),
                    line: token.line,
                })
            }
        }
    }

    let rewritten_calls = edits.len() - 1;
    edits.sort_by_key(|(start, _, _)| *start);
    let mut text = String::with_capacity(source.len() + edits.len() * 8);
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        text.push_str(&source[cursor..start]);
        text.push_str(replacement);
        cursor = end;
    }
    text.push_str(&source[cursor..]);

    Ok(InstrumentedFunction {
        debug_name: new_name.to_string(),
        source_text: text,
        record: pair.record.clone(),
        origin_module: pair.entry.defining_module.clone(),
        origin_name: original.clone(),
        rewritten_calls,
    })
}

/// Instrument every pair, keeping debug names unique across modules.
///
/// When two modules define the same test name, the later one gets the
/// module name appended (`debug_echo_tests_extra`).
pub fn instrument_all(pairs: &[CorrelatedPair], rules: &InstrumentRules) -> InstrumentBatch {
    let mut batch = InstrumentBatch::default();
    let mut taken: BTreeSet<String> = IO_PRIMITIVES
        .iter()
        .map(|(_, wrapper)| *wrapper)
        .chain(PREAMBLE_HELPERS.iter().copied())
        .map(str::to_string)
        .collect();
    for pair in pairs {
        let result = debug_name(&pair.entry.qualified_name, rules).and_then(|base| {
            if taken.contains(&base) {
                let name = format!("{base}_{}", sanitize_identifier(&pair.entry.defining_module));
                instrument_as(pair, &name)
            } else {
                instrument(pair, rules)
            }
        });
        match result {
            Ok(function) if !taken.contains(&function.debug_name) => {
                tracing::debug!(
                    function = %function.debug_name,
                    rewritten_calls = function.rewritten_calls,
                    "instrumented"
                );
                taken.insert(function.debug_name.clone());
                batch.functions.push(function);
            }
            Ok(function) => batch.rejected.push(Rejection {
                record: pair.record.clone(),
                origin_module: pair.entry.defining_module.clone(),
                origin_name: pair.entry.qualified_name.clone(),
                reason: format!("debug name `{}` is already in use", function.debug_name),
            }),
            Err(err) => {
                tracing::warn!(
                    function = %pair.entry.qualified_name,
                    module = %pair.entry.defining_module,
                    error = %err,
                    "instrumentation rejected"
                );
                batch.rejected.push(Rejection {
                    record: pair.record.clone(),
                    origin_module: pair.entry.defining_module.clone(),
                    origin_name: pair.entry.qualified_name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    batch
}

fn wrapper_for(name: &str) -> Option<&'static str> {
    IO_PRIMITIVES
        .iter()
        .find(|(primitive, _)| *primitive == name)
        .map(|(_, wrapper)| *wrapper)
}

enum Use {
    /// `obj.write(...)`: some other object's method, left alone.
    Attribute,
    Call,
    Other,
}

fn classify(source: &str, tokens: &[Token], idx: usize) -> Use {
    let prev = previous_code_token(tokens, idx);
    if prev.is_some_and(|token| token.kind == TokenKind::Punct('.')) {
        return Use::Attribute;
    }
    if prev.is_some_and(|token| {
        token.kind == TokenKind::Name && matches!(token.text(source), "def" | "import" | "class")
    }) {
        return Use::Other;
    }
    match tokens.get(idx + 1) {
        Some(next) if next.kind == TokenKind::Punct('(') => Use::Call,
        _ => Use::Other,
    }
}

fn previous_code_token(tokens: &[Token], idx: usize) -> Option<&Token> {
    tokens[..idx]
        .iter()
        .rev()
        .find(|token| !matches!(token.kind, TokenKind::Comment))
}

fn find_definition<'a>(source: &str, tokens: &'a [Token], name: &str) -> Option<&'a Token> {
    tokens.windows(2).find_map(|pair| {
        let (keyword, ident) = (&pair[0], &pair[1]);
        (keyword.kind == TokenKind::Name
            && keyword.text(source) == "def"
            && ident.kind == TokenKind::Name
            && ident.text(source) == name)
            .then_some(ident)
    })
}

fn sanitize_identifier(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}
