//! Diagnostic reporting for qlbind.
//!
//! The parser and the document validator collect [`Diagnostic`]s into a
//! [`DiagnosticBag`]. The HTTP layer turns them into GraphQL error entries;
//! the CLI renders them through `miette` via [`DiagnosticReport`].

use crate::position::{LineIndex, Location};
use crate::span::Span;
use miette::{LabeledSpan, NamedSource, SourceCode};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// An error that makes the document unusable.
    Error,
    /// A warning that doesn't block execution.
    Warning,
}

/// A label attached to a diagnostic.
#[derive(Debug, Clone)]
pub struct Label {
    /// The span this label points to.
    pub span: Span,
    /// The label message.
    pub message: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// A diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: DiagnosticSeverity,
    /// Error code.
    pub code: String,
    /// Short title.
    pub title: String,
    /// Detailed message.
    pub message: Option<String>,
    /// Labels pointing to source locations.
    pub labels: Vec<Label>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code: code.into(),
            title: title.into(),
            message: None,
            labels: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code: code.into(),
            title: title.into(),
            message: None,
            labels: Vec::new(),
        }
    }

    /// Adds a message to the diagnostic.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a primary label at a span.
    pub fn with_span(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(span, message));
        self
    }

    /// Returns the primary span, if any.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels.first().map(|l| l.span)
    }

    /// The text shown to GraphQL clients: the detailed message when there is
    /// one, the title otherwise.
    pub fn display_message(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.title)
    }

    /// Resolves every label to a line/column location.
    pub fn locations(&self, index: &LineIndex) -> Vec<Location> {
        self.labels
            .iter()
            .map(|label| index.location(label.span.start))
            .collect()
    }
}

/// A collection of diagnostics.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty diagnostic bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Adds an error diagnostic.
    pub fn error(
        &mut self,
        code: impl Into<String>,
        title: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) {
        self.add(Diagnostic::error(code, title).with_span(span, message));
    }

    /// Adds an error whose client-facing message is the title itself.
    pub fn error_at(&mut self, code: impl Into<String>, span: Span, message: impl Into<String>) {
        let message = message.into();
        self.add(Diagnostic::error(code, message.clone()).with_span(span, message));
    }

    /// Moves every diagnostic of `other` into this bag.
    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Returns an iterator over all diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns an iterator over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl IntoIterator for DiagnosticBag {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

/// Common diagnostic codes.
pub mod codes {
    pub const UNEXPECTED_TOKEN: &str = "E0001";
    pub const UNEXPECTED_EOF: &str = "E0002";
    pub const INVALID_SYNTAX: &str = "E0003";
    pub const INVALID_LITERAL: &str = "E0004";
    pub const UNDEFINED_TYPE: &str = "E0010";
    pub const UNDEFINED_FIELD: &str = "E0011";
    pub const DUPLICATE_TYPE: &str = "E0012";
    pub const DUPLICATE_FRAGMENT: &str = "E0013";
    pub const DUPLICATE_OPERATION: &str = "E0014";
    pub const ANONYMOUS_NOT_ALONE: &str = "E0015";
    pub const UNDEFINED_ARGUMENT: &str = "E0016";
    pub const MISSING_ARGUMENT: &str = "E0017";
    pub const UNDEFINED_FRAGMENT: &str = "E0018";
    pub const UNDEFINED_VARIABLE: &str = "E0019";
    pub const UNDEFINED_DIRECTIVE: &str = "E0020";
    pub const SELECTION_MISMATCH: &str = "E0021";
    pub const MISSING_ROOT_TYPE: &str = "E0022";
    pub const FRAGMENT_CYCLE: &str = "E0023";
    pub const INVALID_VALUE: &str = "E0024";
    pub const NOT_EXECUTABLE: &str = "E0025";
    pub const DUPLICATE_NAME: &str = "E0026";
    pub const INVALID_TYPE: &str = "E0027";
    pub const INVALID_SPREAD: &str = "E0028";
    pub const MISPLACED_DIRECTIVE: &str = "E0029";
    pub const VARIABLE_MISMATCH: &str = "E0030";
    pub const SELECTION_TOO_DEEP: &str = "E0031";
}

/// A diagnostic bound to its source text, renderable by `miette`.
#[derive(Debug, Error)]
#[error("{}", .diagnostic.title)]
pub struct DiagnosticReport {
    diagnostic: Diagnostic,
    named_source: NamedSource<String>,
}

impl DiagnosticReport {
    /// Binds a diagnostic to the named source it was reported against.
    pub fn new(diagnostic: Diagnostic, name: impl AsRef<str>, source: impl Into<String>) -> Self {
        Self {
            diagnostic,
            named_source: NamedSource::new(name, source.into()),
        }
    }
}

impl miette::Diagnostic for DiagnosticReport {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic.code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.diagnostic.severity {
            DiagnosticSeverity::Error => miette::Severity::Error,
            DiagnosticSeverity::Warning => miette::Severity::Warning,
        })
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.named_source)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(self.diagnostic.labels.iter().map(|label| {
            LabeledSpan::new_with_span(Some(label.message.clone()), label.span)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_bag() {
        let mut bag = DiagnosticBag::new();
        bag.error("E001", "test error", Span::new(0, 10), "details");

        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 1);
    }

    #[test]
    fn test_diagnostic_creation() {
        let diag = Diagnostic::error("E001", "Test")
            .with_message("Details")
            .with_span(Span::new(0, 5), "here");

        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.primary_span(), Some(Span::new(0, 5)));
        assert_eq!(diag.display_message(), "Details");
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let mut bag = DiagnosticBag::new();
        bag.add(Diagnostic::warning("W001", "unused"));
        assert!(!bag.has_errors());
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_locations() {
        let index = LineIndex::new("{\n  oops\n}");
        let diag = Diagnostic::error(codes::UNDEFINED_FIELD, "bad").with_span(Span::new(4, 8), "");
        assert_eq!(diag.locations(&index), vec![Location { line: 2, column: 3 }]);
    }

    #[test]
    fn test_report_renders_code() {
        let diag = Diagnostic::error(codes::UNEXPECTED_TOKEN, "unexpected token")
            .with_span(Span::new(0, 1), "here");
        let report = DiagnosticReport::new(diag, "query.graphql", "}");
        let code = miette::Diagnostic::code(&report).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some(codes::UNEXPECTED_TOKEN));
        assert_eq!(report.to_string(), "unexpected token");
    }
}
