//! Reporter implementations
//!
//! `ConsoleReporter` renders to any writer (stdout by default);
//! `RecordingReporter` keeps the lines for inspection in tests and for
//! machine-readable output.

use std::io::{self, Write};

use isoprobe_core::Reporter;
use serde::Serialize;

const LABEL_WIDTH: usize = 32;

/// Plain-text reporter
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    /// Reporter writing to stdout
    pub fn stdout() -> Self {
        ConsoleReporter { out: io::stdout() }
    }
}

impl<W: Write> ConsoleReporter<W> {
    /// Reporter writing to `out`
    pub fn new(out: W) -> Self {
        ConsoleReporter { out }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    // Reporting is best effort; a closed stdout must not fail the run.
    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn header(&mut self, title: &str) {
        self.line("");
        self.line(&format!("== {} ==", title));
    }

    fn info(&mut self, text: &str) {
        self.line(text);
    }

    fn error(&mut self, text: &str) {
        self.line(&format!("[!] {}", text));
    }

    fn print_left(&mut self, label: &str, value: &str) {
        self.line(&format!("{:<width$}{}", format!("{}:", label), value, width = LABEL_WIDTH));
    }
}

/// One reported line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    /// Section header
    Header {
        /// Title
        text: String,
    },
    /// Informational line
    Info {
        /// Text
        text: String,
    },
    /// Error / anomaly line
    Error {
        /// Text
        text: String,
    },
    /// Label / value pair
    Field {
        /// Label
        label: String,
        /// Value
        value: String,
    },
}

/// Reporter that keeps every line
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    lines: Vec<ReportLine>,
}

impl RecordingReporter {
    /// Empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line, in order
    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    /// Text of every error line
    pub fn errors(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                ReportLine::Error { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of every info line
    pub fn infos(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                ReportLine::Info { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Value of the last field with `label`
    pub fn field(&self, label: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            ReportLine::Field { label: l, value } if l == label => Some(value.as_str()),
            _ => None,
        })
    }

    /// Replay the recording into another reporter
    pub fn replay(&self, into: &mut dyn Reporter) {
        for line in &self.lines {
            match line {
                ReportLine::Header { text } => into.header(text),
                ReportLine::Info { text } => into.info(text),
                ReportLine::Error { text } => into.error(text),
                ReportLine::Field { label, value } => into.print_left(label, value),
            }
        }
    }
}

impl Reporter for RecordingReporter {
    fn header(&mut self, title: &str) {
        self.lines.push(ReportLine::Header {
            text: title.to_string(),
        });
    }

    fn info(&mut self, text: &str) {
        self.lines.push(ReportLine::Info {
            text: text.to_string(),
        });
    }

    fn error(&mut self, text: &str) {
        self.lines.push(ReportLine::Error {
            text: text.to_string(),
        });
    }

    fn print_left(&mut self, label: &str, value: &str) {
        self.lines.push(ReportLine::Field {
            label: label.to_string(),
            value: value.to_string(),
        });
    }
}
