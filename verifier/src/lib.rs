//! Contract Analyzer Library
//!
//! Semantic analysis and verification backend for contract-annotated
//! programs: contract simplification, division-by-zero checking, taint
//! tracking over declared effects, local dataflow checks and k-induction
//! over counting loops.
//!
//! Input is an already bound module ([`ast::BoundModule`]); parsing and
//! name resolution happen upstream.

pub mod analysis;
pub mod ast;
pub mod bugs;
pub mod contracts;
pub mod dataflow;
pub mod diagnostics;
pub mod effects;
pub mod error;
pub mod kinduction;
pub mod loops;
pub mod simplify;
pub mod smt;
pub mod taint;

pub use analysis::{VerificationAnalysisPass, VerificationAnalysisResult, VerificationOptions};
pub use ast::{BoundModule, Span};
pub use contracts::ContractSimplificationPass;
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Severity};
pub use error::{AnalysisError, ConfigError, Result, SmtError};
pub use simplify::ExpressionSimplifier;
