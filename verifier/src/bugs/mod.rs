//! Bug-pattern checkers
//!
//! A checker walks one bound function and reports what it finds straight
//! into the diagnostic sink, returning how many diagnostics it added.

mod division;

pub use division::DivisionByZeroChecker;

use crate::ast::BoundFunction;
use crate::diagnostics::DiagnosticSink;

pub trait BugPatternChecker {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn check(&self, function: &BoundFunction, sink: &DiagnosticSink) -> usize;
}
