//! Reporting of recoverable problems found while decoding.
//!
//! Damaged streams are common in the wild, so most problems don't abort
//! decoding. Instead, they are handed to a [`DiagnosticSink`] together with
//! the byte position they were found at, and decoding continues.

use core::fmt;

/// The severity of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The stream deviates from the standard in a harmless way.
    SyntaxWarning,
    /// The stream is malformed. The decoded image may be damaged.
    SyntaxError,
    /// The stream uses a feature the decoder doesn't support, which is
    /// skipped.
    Unimplemented,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxWarning => write!(f, "syntax warning"),
            Self::SyntaxError => write!(f, "syntax error"),
            Self::Unimplemented => write!(f, "unimplemented"),
        }
    }
}

/// A receiver for problems found while decoding.
pub trait DiagnosticSink {
    /// Report a problem. `position` is the byte offset in the source the
    /// problem was found at, if known.
    fn report(&mut self, severity: Severity, position: Option<u64>, message: fmt::Arguments<'_>);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn report(&mut self, severity: Severity, position: Option<u64>, message: fmt::Arguments<'_>) {
        (**self).report(severity, position, message);
    }
}

/// A sink that forwards all reports to the `log` crate, if the `logging`
/// feature is enabled, and drops them otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, severity: Severity, position: Option<u64>, message: fmt::Arguments<'_>) {
        match position {
            Some(position) => lwarn!("JPX {} ({}): {}", severity, position, message),
            None => lwarn!("JPX {}: {}", severity, message),
        }
    }
}

/// A single collected report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// The severity of the problem.
    pub severity: Severity,
    /// The byte offset the problem was found at.
    pub position: Option<u64>,
    /// A human-readable description.
    pub message: String,
}

/// A sink that keeps all reports in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    reports: Vec<Report>,
}

impl CollectingSink {
    /// Create a new, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports collected so far, in the order they were made.
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// The number of collected reports with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }

    /// Remove all collected reports.
    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, severity: Severity, position: Option<u64>, message: fmt::Arguments<'_>) {
        self.reports.push(Report {
            severity,
            position,
            message: message.to_string(),
        });
    }
}
