//! SMT solver adapter
//!
//! Analyses talk to a solver only through [`SmtSolver`]: an availability
//! probe plus a single satisfiability check over a QF_LIA script. Every
//! fault (missing binary, timeout, malformed output) degrades to
//! [`SatResult::Unknown`], which callers treat as "not proven".

mod script;
mod z3;

pub use script::{SmtScript, SmtSort, sanitize_name, translate_expr};
pub use z3::Z3Solver;

use serde::{Deserialize, Serialize};

/// Default per-query timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl std::fmt::Display for SatResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SatResult::Sat => write!(f, "sat"),
            SatResult::Unsat => write!(f, "unsat"),
            SatResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// A satisfiability oracle
pub trait SmtSolver {
    /// Whether queries can be answered at all. Cheap after the first call.
    fn is_available(&self) -> bool;

    /// Check the script's assertions. Never blocks longer than roughly
    /// `timeout_ms`; faults are reported as `Unknown`.
    fn check_sat(&self, script: &SmtScript, timeout_ms: u64) -> SatResult;
}

/// Stand-in when no solver is configured: never available, never decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSolver;

impl SmtSolver for NullSolver {
    fn is_available(&self) -> bool {
        false
    }

    fn check_sat(&self, _script: &SmtScript, _timeout_ms: u64) -> SatResult {
        SatResult::Unknown
    }
}

/// A solver handle bundled with its per-query timeout.
///
/// Analyses receive `Option<&SmtSession>`; `None` means SMT is disabled or
/// the solver was found unavailable when the pass started.
pub struct SmtSession<'a> {
    solver: &'a dyn SmtSolver,
    timeout_ms: u64,
}

impl<'a> SmtSession<'a> {
    pub fn new(solver: &'a dyn SmtSolver, timeout_ms: u64) -> Self {
        Self { solver, timeout_ms }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn check(&self, script: &SmtScript) -> SatResult {
        let result = self.solver.check_sat(script, self.timeout_ms);
        tracing::debug!(%result, assertions = script.assertion_count(), "smt query");
        result
    }
}
