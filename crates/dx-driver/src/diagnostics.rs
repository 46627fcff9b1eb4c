//! Diagnostic sink
//!
//! Passes report findings through a [`DiagnosticSink`]; reporting never
//! fails. The driver checks for fatal diagnostics at the end of each
//! pass and aborts the compilation when any were raised; non-fatal
//! diagnostics accumulate and are surfaced at the end regardless.

use parking_lot::Mutex;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational
    Info,
    /// Warning; output is still produced
    Warning,
    /// Error; compilation aborts at the next pass boundary
    Error,
}

/// Where a diagnostic points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticLocation {
    /// A class, by descriptor
    Class(String),
    /// A method, by qualified description
    Method(String),
    /// No specific location
    Unknown,
}

/// One reported diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Location
    pub location: DiagnosticLocation,
}

impl Diagnostic {
    /// Warning diagnostic
    #[inline]
    #[must_use]
    pub fn warning(message: impl Into<String>, location: DiagnosticLocation) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location,
        }
    }

    /// Error diagnostic
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>, location: DiagnosticLocation) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location,
        }
    }
}

/// Consumer of diagnostics; implementations never fail
pub trait DiagnosticSink: Send + Sync {
    /// Report one diagnostic
    fn report(&self, diagnostic: Diagnostic);
}

/// Accumulating sink used by the driver
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    /// Empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of error-severity diagnostics so far
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Snapshot of everything reported so far
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_accumulates_and_counts_errors() {
        let sink = CollectingSink::new();
        sink.report(Diagnostic::warning("w", DiagnosticLocation::Unknown));
        sink.report(Diagnostic::error(
            "e",
            DiagnosticLocation::Class("LFoo;".to_string()),
        ));

        assert_eq!(sink.entries().len(), 2);
        assert_eq!(sink.error_count(), 1);
    }
}
