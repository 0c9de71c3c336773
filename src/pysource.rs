//! Minimal Python tokenizer.
//!
//! Test implementations are kept as verbatim text and rewritten textually.
//! This lexer only knows enough Python to make that safe: it separates
//! identifiers from string literals and comments, tracks bracket nesting,
//! and reports where each token sits in the line. It never fails; malformed
//! input (an unterminated string, say) simply produces a longer token.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    Comment,
    /// A single punctuation or operator character.
    Punct(char),
    Newline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offsets into the source.
    pub start: usize,
    pub end: usize,
    /// 1-based line of `start`.
    pub line: usize,
    /// Byte column of `start` within its line.
    pub column: usize,
    /// Open `(`, `[` and `{` before this token.
    pub depth: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// True for code tokens that begin at column zero outside any brackets.
    pub fn at_top_level(&self) -> bool {
        self.column == 0 && self.depth == 0
    }
}

/// Tokenize `source`. Whitespace between tokens is dropped.
pub fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let ch = self.bytes[self.pos];
            match ch {
                b'\n' => {
                    self.push(TokenKind::Newline, self.pos, self.pos + 1);
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                }
                b' ' | b'\t' | b'\r' | b'\x0c' => self.pos += 1,
                b'\\' => {
                    // Explicit line continuation: swallow the backslash and newline.
                    self.pos += 1;
                    if self.bytes.get(self.pos) == Some(&b'\n') {
                        self.pos += 1;
                        self.line += 1;
                        self.line_start = self.pos;
                    }
                }
                b'#' => {
                    let end = self.src[self.pos..]
                        .find('\n')
                        .map_or(self.bytes.len(), |offset| self.pos + offset);
                    self.push(TokenKind::Comment, self.pos, end);
                    self.pos = end;
                }
                b'\'' | b'"' => self.string(self.pos),
                _ if is_ident_start(ch) => self.name_or_prefixed_string(),
                _ if ch.is_ascii_digit() => self.number(),
                _ => self.punct(),
            }
        }
        self.tokens
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        let (line, column) = self.position_of(start);
        self.tokens.push(Token {
            kind,
            start,
            end,
            line,
            column,
            depth: self.depth,
        });
    }

    /// Line and column for `offset`, which must not precede the current line
    /// start unless it is the start of a token spanning lines.
    fn position_of(&self, offset: usize) -> (usize, usize) {
        if offset >= self.line_start {
            return (self.line, offset - self.line_start);
        }
        let before = &self.src[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(offset, |nl| offset - nl - 1);
        (line, column)
    }

    fn name_or_prefixed_string(&mut self) {
        let start = self.pos;
        let mut end = start;
        while end < self.bytes.len() && is_ident_continue(self.bytes[end]) {
            end += 1;
        }
        let word = &self.src[start..end];
        if matches!(self.bytes.get(end), Some(b'\'' | b'"')) && is_string_prefix(word) {
            self.pos = end;
            self.string(start);
            return;
        }
        self.push(TokenKind::Name, start, end);
        self.pos = end;
    }

    fn string(&mut self, start: usize) {
        let quote = self.bytes[self.pos];
        let triple = self.bytes.get(self.pos + 1) == Some(&quote)
            && self.bytes.get(self.pos + 2) == Some(&quote);
        let mut cursor = self.pos + if triple { 3 } else { 1 };
        let mut end = self.bytes.len();
        let mut newlines = 0;
        let mut last_newline = None;
        while cursor < self.bytes.len() {
            let ch = self.bytes[cursor];
            if ch == b'\\' {
                // Raw strings still cannot end on an escaped quote.
                if self.bytes.get(cursor + 1) == Some(&b'\n') {
                    newlines += 1;
                    last_newline = Some(cursor + 1);
                }
                cursor += 2;
                continue;
            }
            if ch == b'\n' {
                if !triple {
                    end = cursor;
                    break;
                }
                newlines += 1;
                last_newline = Some(cursor);
            }
            if ch == quote {
                if !triple {
                    end = cursor + 1;
                    break;
                }
                if self.bytes.get(cursor + 1) == Some(&quote)
                    && self.bytes.get(cursor + 2) == Some(&quote)
                {
                    end = cursor + 3;
                    break;
                }
            }
            cursor += 1;
        }
        let end = end.min(self.bytes.len());
        self.push(TokenKind::Str, start, end);
        if let Some(newline) = last_newline.filter(|nl| *nl < end) {
            self.line += newlines;
            self.line_start = newline + 1;
        }
        self.pos = end;
    }

    fn number(&mut self) {
        let start = self.pos;
        let mut end = start;
        while end < self.bytes.len()
            && (self.bytes[end].is_ascii_alphanumeric()
                || self.bytes[end] == b'_'
                || self.bytes[end] == b'.')
        {
            end += 1;
        }
        self.push(TokenKind::Number, start, end);
        self.pos = end;
    }

    fn punct(&mut self) {
        let start = self.pos;
        let ch = self.src[start..].chars().next().unwrap_or('\u{fffd}');
        let end = start + ch.len_utf8().max(1);
        match ch {
            '(' | '[' | '{' => {
                self.push(TokenKind::Punct(ch), start, end);
                self.depth += 1;
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                self.push(TokenKind::Punct(ch), start, end);
            }
            _ => self.push(TokenKind::Punct(ch), start, end),
        }
        self.pos = end;
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch == b'_' || ch.is_ascii_alphabetic() || ch >= 0x80
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
    )
}

/// Byte offset of the start of the line containing `offset`.
pub fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |nl| nl + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(source: &str) -> Vec<&str> {
        lex(source)
            .into_iter()
            .filter(|token| token.kind == TokenKind::Name)
            .map(|token| token.text(source))
            .collect()
    }

    #[test]
    fn strings_and_comments_hide_identifiers() {
        let source = "write(p, \"write(x)\")  # write(y)\n";
        assert_eq!(names(source), vec!["write", "p"]);
    }

    #[test]
    fn prefixed_and_triple_quoted_strings() {
        let source = "x = f\"{write}\"\ny = '''\nwrite(\n'''\nz = rb'\\''\n";
        assert_eq!(names(source), vec!["x", "y", "z"]);
        let tokens = lex(source);
        let z = tokens
            .iter()
            .find(|token| token.text(source) == "z")
            .unwrap();
        assert_eq!(z.line, 5);
        assert_eq!(z.column, 0);
    }

    #[test]
    fn tracks_depth_and_columns() {
        let source = "def f(a,\nb):\n    return a\n";
        let tokens = lex(source);
        let b = tokens.iter().find(|t| t.text(source) == "b").unwrap();
        assert_eq!(b.column, 0);
        assert_eq!(b.depth, 1);
        assert!(!b.at_top_level());
        let ret = tokens.iter().find(|t| t.text(source) == "return").unwrap();
        assert_eq!(ret.line, 3);
        assert_eq!(ret.column, 4);
    }

    #[test]
    fn unterminated_string_ends_at_newline() {
        let source = "s = 'oops\nnext = 1\n";
        assert_eq!(names(source), vec!["s", "next"]);
    }

    #[test]
    fn line_start_finds_previous_newline() {
        let source = "ab\ncd";
        assert_eq!(line_start(source, 4), 3);
        assert_eq!(line_start(source, 1), 0);
    }
}
