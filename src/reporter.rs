//! Operator-facing output.
//!
//! Components receive a `&mut dyn Reporter` instead of printing directly, so
//! console state stays out of the pipeline and tests can capture what an
//! operator would have seen.
use std::io::Write;

pub trait Reporter {
    fn header(&mut self, text: &str);
    fn info(&mut self, text: &str);
    fn success(&mut self, text: &str);
    fn failure(&mut self, text: &str);
    /// Indented continuation lines (captured output, expected values).
    fn detail(&mut self, text: &str);
}

/// Plain-text reporter writing to any sink (stdout in production).
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleReporter<W> {
    #[cfg(test)]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // Console write failures (closed pipe) are not worth aborting a run.
        let _ = writeln!(self.out, "{text}");
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn header(&mut self, text: &str) {
        let rule = "=".repeat(72);
        self.line("");
        self.line(&rule);
        self.line(&format!("== {text}"));
        self.line(&rule);
    }

    fn info(&mut self, text: &str) {
        self.line(&format!("i {text}"));
    }

    fn success(&mut self, text: &str) {
        self.line(&format!("+ {text}"));
    }

    fn failure(&mut self, text: &str) {
        self.line(&format!("x {text}"));
    }

    fn detail(&mut self, text: &str) {
        for line in text.lines() {
            self.line(&format!("    {line}"));
        }
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Header,
    Info,
    Success,
    Failure,
    Detail,
}

/// Collects reported lines for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub lines: Vec<(Level, String)>,
}

#[cfg(test)]
impl MemoryReporter {
    pub fn count(&self, level: Level) -> usize {
        self.lines.iter().filter(|(lvl, _)| *lvl == level).count()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines
            .iter()
            .any(|(lvl, text)| *lvl == level && text.contains(needle))
    }
}

#[cfg(test)]
impl Reporter for MemoryReporter {
    fn header(&mut self, text: &str) {
        self.lines.push((Level::Header, text.to_string()));
    }

    fn info(&mut self, text: &str) {
        self.lines.push((Level::Info, text.to_string()));
    }

    fn success(&mut self, text: &str) {
        self.lines.push((Level::Success, text.to_string()));
    }

    fn failure(&mut self, text: &str) {
        self.lines.push((Level::Failure, text.to_string()));
    }

    fn detail(&mut self, text: &str) {
        self.lines.push((Level::Detail, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_reporter_prefixes_levels() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        reporter.header("Run");
        reporter.success("ok");
        reporter.failure("bad");
        reporter.detail("a\nb");
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.contains("== Run\n"));
        assert!(text.contains("+ ok\n"));
        assert!(text.contains("x bad\n"));
        assert!(text.contains("    a\n    b\n"));
    }
}
