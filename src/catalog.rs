//! Test implementation catalog.
//!
//! Test sources are scanned as text. A test implementation is a top-level
//! `def` whose name starts with the test prefix; its entry keeps the exact
//! source block (decorators included) so it can be rewritten and reinserted
//! later without reformatting.
//!
//! Enumeration order is part of the contract: files in the order given, then
//! entries by name within each file. Correlation ties are broken by it.
use crate::pysource::{self, Token, TokenKind};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One discovered test implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub qualified_name: String,
    pub defining_module: String,
    pub path: PathBuf,
    #[serde(skip)]
    pub source_text: String,
}

/// Files in `dir` named `<prefix>*<suffix>`, sorted by file name.
pub fn find_test_sources(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(suffix)
        {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Load every test implementation from `paths`, in catalog order.
pub fn discover(paths: &[PathBuf], test_prefix: &str) -> Result<Vec<FunctionEntry>> {
    let mut entries = Vec::new();
    for path in paths {
        let source =
            fs::read_to_string(path).with_context(|| format!("read test source {}", path.display()))?;
        let module = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let found = extract_definitions(&source, test_prefix);
        tracing::debug!(path = %path.display(), functions = found.len(), "scanned test source");
        entries.extend(found.into_iter().map(|(name, text)| FunctionEntry {
            qualified_name: name,
            defining_module: module.clone(),
            path: path.clone(),
            source_text: text,
        }));
    }
    Ok(entries)
}

/// Top-level definitions starting with `test_prefix`, keyed and sorted by name.
///
/// A redefinition replaces the earlier block, as it would at import time.
pub fn extract_definitions(source: &str, test_prefix: &str) -> BTreeMap<String, String> {
    let tokens = pysource::lex(source);
    let mut found = BTreeMap::new();

    for (idx, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Name || !token.at_top_level() || token.text(source) != "def" {
            continue;
        }
        let Some(name_token) = tokens.get(idx + 1).filter(|t| t.kind == TokenKind::Name) else {
            continue;
        };
        let name = name_token.text(source);
        if !name.starts_with(test_prefix) {
            continue;
        }
        let start = block_start(source, &tokens, idx);
        let end = block_end(source, &tokens, idx);
        found.insert(name.to_string(), normalize_block(&source[start..end]));
    }
    found
}

/// Start of the block, pulled back over decorator lines directly above it.
fn block_start(source: &str, tokens: &[Token], def_idx: usize) -> usize {
    let mut start = tokens[def_idx].start;
    let mut idx = def_idx;
    loop {
        // Walk back to the first token of the previous logical line.
        let mut prev = idx;
        while prev > 0 && tokens[prev - 1].kind == TokenKind::Newline {
            prev -= 1;
        }
        if prev == 0 {
            break;
        }
        let mut first = prev - 1;
        while first > 0
            && !(tokens[first - 1].kind == TokenKind::Newline && tokens[first - 1].depth == 0)
        {
            first -= 1;
        }
        let candidate = &tokens[first];
        if candidate.kind == TokenKind::Punct('@') && candidate.at_top_level() {
            start = candidate.start;
            idx = first;
        } else {
            break;
        }
    }
    pysource::line_start(source, start)
}

/// End of the block: the start of the line holding the next top-level code
/// token after the `def` header.
fn block_end(source: &str, tokens: &[Token], def_idx: usize) -> usize {
    let def_line = tokens[def_idx].line;
    tokens[def_idx + 1..]
        .iter()
        .filter(|token| token.line > def_line)
        .find(|token| {
            token.at_top_level() && !matches!(token.kind, TokenKind::Newline | TokenKind::Comment)
        })
        .map_or(source.len(), |token| pysource::line_start(source, token.start))
}

/// Drop trailing blank and column-zero comment lines; end with one newline.
fn normalize_block(block: &str) -> String {
    let mut lines: Vec<&str> = block.lines().collect();
    while let Some(last) = lines.last() {
        if last.trim().is_empty() || last.starts_with('#') {
            lines.pop();
        } else {
            break;
        }
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
