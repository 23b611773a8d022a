//! Diagnostic codes, severities and the shared append-only sink

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::Span;

/// Closed set of diagnostics the analyses can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    DivisionByZero,
    SqlInjection,
    CommandInjection,
    PathTraversal,
    OpenRedirect,
    CrossSiteScripting,
    ContractTautology,
    ContractContradiction,
    ContractSimplified,
    UnusedVariable,
    DeadStore,
    InvariantNotProven,
    InvariantSynthesized,
    AnalysisFailed,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 14] = [
        DiagnosticCode::DivisionByZero,
        DiagnosticCode::SqlInjection,
        DiagnosticCode::CommandInjection,
        DiagnosticCode::PathTraversal,
        DiagnosticCode::OpenRedirect,
        DiagnosticCode::CrossSiteScripting,
        DiagnosticCode::ContractTautology,
        DiagnosticCode::ContractContradiction,
        DiagnosticCode::ContractSimplified,
        DiagnosticCode::UnusedVariable,
        DiagnosticCode::DeadStore,
        DiagnosticCode::InvariantNotProven,
        DiagnosticCode::InvariantSynthesized,
        DiagnosticCode::AnalysisFailed,
    ];

    /// Stable identifier, e.g. `CA0001`
    pub fn id(self) -> &'static str {
        match self {
            DiagnosticCode::DivisionByZero => "CA0001",
            DiagnosticCode::SqlInjection => "CA0002",
            DiagnosticCode::CommandInjection => "CA0003",
            DiagnosticCode::PathTraversal => "CA0004",
            DiagnosticCode::OpenRedirect => "CA0005",
            DiagnosticCode::CrossSiteScripting => "CA0006",
            DiagnosticCode::ContractTautology => "CA0010",
            DiagnosticCode::ContractContradiction => "CA0011",
            DiagnosticCode::ContractSimplified => "CA0012",
            DiagnosticCode::UnusedVariable => "CA0020",
            DiagnosticCode::DeadStore => "CA0021",
            DiagnosticCode::InvariantNotProven => "CA0030",
            DiagnosticCode::InvariantSynthesized => "CA0031",
            DiagnosticCode::AnalysisFailed => "CA0099",
        }
    }

    /// Kebab-case name
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticCode::DivisionByZero => "division-by-zero",
            DiagnosticCode::SqlInjection => "sql-injection",
            DiagnosticCode::CommandInjection => "command-injection",
            DiagnosticCode::PathTraversal => "path-traversal",
            DiagnosticCode::OpenRedirect => "open-redirect",
            DiagnosticCode::CrossSiteScripting => "cross-site-scripting",
            DiagnosticCode::ContractTautology => "contract-tautology",
            DiagnosticCode::ContractContradiction => "contract-contradiction",
            DiagnosticCode::ContractSimplified => "contract-simplified",
            DiagnosticCode::UnusedVariable => "unused-variable",
            DiagnosticCode::DeadStore => "dead-store",
            DiagnosticCode::InvariantNotProven => "invariant-not-proven",
            DiagnosticCode::InvariantSynthesized => "invariant-synthesized",
            DiagnosticCode::AnalysisFailed => "analysis-failed",
        }
    }

    pub fn is_taint(self) -> bool {
        matches!(
            self,
            DiagnosticCode::SqlInjection
                | DiagnosticCode::CommandInjection
                | DiagnosticCode::PathTraversal
                | DiagnosticCode::OpenRedirect
                | DiagnosticCode::CrossSiteScripting
        )
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            span,
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Error, message, span)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Warning, message, span)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Info, message, span)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {} at {}: {}",
            self.severity,
            self.code.id(),
            self.code.name(),
            self.span,
            self.message
        )
    }
}

/// Append-only collection of diagnostics
#[derive(Debug, Default, Clone, Serialize)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Shared handle on a [`DiagnosticBag`].
///
/// Cloning the sink shares the bag; every pass handed a clone appends to the
/// same collection. Single-threaded only.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    bag: Rc<RefCell<DiagnosticBag>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        tracing::trace!(code = diagnostic.code.id(), span = %diagnostic.span, "diagnostic");
        self.bag.borrow_mut().diagnostics.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.bag.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bag.borrow().is_empty()
    }

    /// Copy of everything reported so far, in report order
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.bag.borrow().diagnostics.clone()
    }

    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.bag.borrow().iter().filter(|d| d.code == code).count()
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.bag.borrow().iter().filter(|d| d.severity == severity).count()
    }

    pub fn with_code(&self, code: DiagnosticCode) -> Vec<Diagnostic> {
        self.bag.borrow().iter().filter(|d| d.code == code).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_have_unique_ids_and_names() {
        let ids: HashSet<_> = DiagnosticCode::ALL.iter().map(|c| c.id()).collect();
        let names: HashSet<_> = DiagnosticCode::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(ids.len(), DiagnosticCode::ALL.len());
        assert_eq!(names.len(), DiagnosticCode::ALL.len());
        for code in DiagnosticCode::ALL {
            assert!(code.id().starts_with("CA"));
            assert!(!code.name().contains(' '));
        }
    }

    #[test]
    fn test_sink_clones_share_bag() {
        let sink = DiagnosticSink::new();
        let handle = sink.clone();
        handle.report(Diagnostic::warning(DiagnosticCode::DeadStore, "x", Span::new(0, 1)));
        sink.report(Diagnostic::error(DiagnosticCode::DivisionByZero, "y", Span::new(2, 3)));

        assert_eq!(sink.len(), 2);
        assert_eq!(handle.count(DiagnosticCode::DivisionByZero), 1);
        assert_eq!(handle.count_severity(Severity::Warning), 1);
        let all = sink.snapshot();
        assert_eq!(all[0].code, DiagnosticCode::DeadStore);
        assert_eq!(all[1].code, DiagnosticCode::DivisionByZero);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::info(DiagnosticCode::ContractTautology, "always true", Span::new(4, 9));
        assert_eq!(d.to_string(), "info[CA0010] contract-tautology at 4..9: always true");
    }
}
