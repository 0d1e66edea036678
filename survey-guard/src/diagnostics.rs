//! Human-readable diagnostics for recoverable problems.
//!
//! Skipped joins, dropped filter terms, cardinality remediation and skipped QA
//! rules never abort a run. Each one is recorded here, in the order it
//! happened, and mirrored to `tracing` so it shows up in logs as well.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Informational; the engine adjusted its behavior on its own
    Info,
    /// Something was skipped
    Warning,
}

/// What part of the pipeline produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A join was skipped
    Join,
    /// A filter term was dropped
    Filter,
    /// Aggregation input was skipped or could not be computed
    Aggregation,
    /// Group cardinality was high or remediated
    Cardinality,
    /// A QA rule could not be applied
    QaRule,
    /// A summary or its table was skipped
    Summary,
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Producing component
    pub kind: DiagnosticKind,
    /// Name of the summary, join or table the diagnostic belongs to
    pub scope: String,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warning => "warning",
        };
        write!(f, "[{level}] {}: {}", self.scope, self.message)
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and logs it.
    pub fn warn(&mut self, kind: DiagnosticKind, scope: impl Into<String>, message: impl Into<String>) {
        let (scope, message) = (scope.into(), message.into());
        warn!(kind = ?kind, scope = %scope, "{message}");
        self.entries.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            kind,
            scope,
            message,
        });
    }

    /// Records an informational diagnostic and logs it.
    pub fn info(&mut self, kind: DiagnosticKind, scope: impl Into<String>, message: impl Into<String>) {
        let (scope, message) = (scope.into(), message.into());
        info!(kind = ?kind, scope = %scope, "{message}");
        self.entries.push(Diagnostic {
            level: DiagnosticLevel::Info,
            kind,
            scope,
            message,
        });
    }

    /// Moves all entries of `other` to the end of this collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// All diagnostics in the order they were recorded.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Diagnostics produced by one component.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    /// Number of warnings.
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
