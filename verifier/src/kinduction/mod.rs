//! K-induction over counting loops
//!
//! The loop is modelled as a single integer state variable moving by a
//! constant delta while its guard holds. Each unrolled state gets its own
//! SMT constant (`i__s0`, `i__s1`, ...); other variables in the invariant
//! are shared across states and so treated as loop-invariant.
//!
//! For k = 1..=max_k:
//! - base case: starting from the initial value, no state reachable in
//!   fewer than k guarded steps violates the invariant;
//! - inductive step: k consecutive guarded states satisfying the invariant
//!   force the next state to satisfy it too.

use std::collections::HashMap;

use serde::Serialize;

use crate::ast::{BinaryOp, BoundExpr, Span, Type};
use crate::error::SmtError;
use crate::loops::{TransitionInfo, WhileLoopInfo};
use crate::smt::{SatResult, SmtScript, SmtSession, SmtSolver};

pub const DEFAULT_MAX_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KInductionResult {
    /// Both obligations hold at this depth
    Proven { k: usize },
    /// The base case found a reachable violating state
    Refuted,
    /// Out of depth, solver gave up, or the loop could not be encoded
    NotProven,
}

impl KInductionResult {
    pub fn is_proven(self) -> bool {
        matches!(self, KInductionResult::Proven { .. })
    }
}

/// What one query told us
enum Outcome {
    Holds,
    Fails,
    GaveUp,
}

pub struct KInductionEngine<'a> {
    solver: &'a dyn SmtSolver,
    timeout_ms: u64,
    max_k: usize,
}

impl<'a> KInductionEngine<'a> {
    pub fn new(solver: &'a dyn SmtSolver, timeout_ms: u64) -> Self {
        Self {
            solver,
            timeout_ms,
            max_k: DEFAULT_MAX_K,
        }
    }

    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k;
        self
    }

    /// Try to prove `invariant` for the loop described by `info` and
    /// `transition`. Without an `initial` value only the inductive step is
    /// checked.
    pub fn prove(
        &self,
        info: &WhileLoopInfo,
        transition: &TransitionInfo,
        invariant: &BoundExpr,
        initial: Option<i64>,
    ) -> KInductionResult {
        let Some(variable) = info.variable.as_deref() else {
            return KInductionResult::NotProven;
        };
        let Some(delta) = transition.delta else {
            return KInductionResult::NotProven;
        };
        if !transition.is_well_formed() || transition.variable != variable {
            return KInductionResult::NotProven;
        }
        if !self.solver.is_available() {
            tracing::debug!("k-induction skipped, solver unavailable");
            return KInductionResult::NotProven;
        }

        let problem = Problem {
            variable,
            delta,
            guard: guard_expr(variable, info),
            invariant,
        };
        let session = SmtSession::new(self.solver, self.timeout_ms);

        for k in 1..=self.max_k {
            if let Some(init) = initial {
                match self.run(&session, problem.base_case(k, init)) {
                    Outcome::Holds => {}
                    Outcome::Fails => {
                        tracing::debug!(k, invariant = %invariant, "base case refuted");
                        return KInductionResult::Refuted;
                    }
                    Outcome::GaveUp => return KInductionResult::NotProven,
                }
            }
            match self.run(&session, problem.step(k)) {
                Outcome::Holds => {
                    tracing::debug!(k, invariant = %invariant, "invariant proven");
                    return KInductionResult::Proven { k };
                }
                Outcome::Fails => continue,
                Outcome::GaveUp => return KInductionResult::NotProven,
            }
        }
        KInductionResult::NotProven
    }

    /// Each query asserts the negation of its obligation, so unsat means
    /// the obligation holds.
    fn run(&self, session: &SmtSession<'_>, script: Result<SmtScript, SmtError>) -> Outcome {
        let script = match script {
            Ok(script) => script,
            Err(err) => {
                tracing::debug!(error = %err, "k-induction query not encodable");
                return Outcome::GaveUp;
            }
        };
        match session.check(&script) {
            SatResult::Unsat => Outcome::Holds,
            SatResult::Sat => Outcome::Fails,
            SatResult::Unknown => Outcome::GaveUp,
        }
    }
}

/// Conjunction of the recognized guards, `true` when there are none
fn guard_expr(variable: &str, info: &WhileLoopInfo) -> BoundExpr {
    let span = Span::default();
    info.guards
        .iter()
        .map(|g| {
            BoundExpr::binary(
                g.op,
                BoundExpr::var(variable, Type::Int, span),
                BoundExpr::int(g.bound, span),
                span,
            )
        })
        .reduce(|acc, g| BoundExpr::binary(BinaryOp::And, acc, g, span))
        .unwrap_or_else(|| BoundExpr::boolean(true, span))
}

fn state_name(variable: &str, index: usize) -> String {
    format!("{variable}__s{index}")
}

struct Problem<'p> {
    variable: &'p str,
    delta: i64,
    guard: BoundExpr,
    invariant: &'p BoundExpr,
}

impl Problem<'_> {
    fn at(&self, script: &mut SmtScript, expr: &BoundExpr, index: usize) -> Result<String, SmtError> {
        let renames = HashMap::from([(self.variable.to_string(), state_name(self.variable, index))]);
        script.translate(expr, &renames)
    }

    /// `s_{i+1} = s_i + delta`
    fn transition(&self, script: &mut SmtScript, index: usize) -> Result<String, SmtError> {
        let span = Span::default();
        let next = BoundExpr::var(state_name(self.variable, index + 1), Type::Int, span);
        let step = BoundExpr::binary(
            BinaryOp::Add,
            BoundExpr::var(state_name(self.variable, index), Type::Int, span),
            BoundExpr::int(self.delta, span),
            span,
        );
        script.translate(&BoundExpr::binary(BinaryOp::Eq, next, step, span), &HashMap::new())
    }

    /// Some state `j < k` on a guarded path from `init` breaks the invariant
    fn base_case(&self, k: usize, init: i64) -> Result<SmtScript, SmtError> {
        let mut script = SmtScript::new();
        let start = BoundExpr::binary(
            BinaryOp::Eq,
            BoundExpr::var(self.variable, Type::Int, Span::default()),
            BoundExpr::int(init, Span::default()),
            Span::default(),
        );
        let start = self.at(&mut script, &start, 0)?;
        script.assert(start);
        for i in 0..k.saturating_sub(1) {
            let transition = self.transition(&mut script, i)?;
            script.assert(transition);
        }

        let mut violations = Vec::new();
        for j in 0..k {
            let mut conjuncts = Vec::new();
            for i in 0..j {
                conjuncts.push(self.at(&mut script, &self.guard, i)?);
            }
            conjuncts.push(format!("(not {})", self.at(&mut script, self.invariant, j)?));
            violations.push(and(conjuncts));
        }
        script.assert(or(violations));
        Ok(script)
    }

    /// k guarded states satisfying the invariant, the next one not
    fn step(&self, k: usize) -> Result<SmtScript, SmtError> {
        let mut script = SmtScript::new();
        for i in 0..k {
            let holds = self.at(&mut script, self.invariant, i)?;
            script.assert(holds);
            let guard = self.at(&mut script, &self.guard, i)?;
            script.assert(guard);
            let transition = self.transition(&mut script, i)?;
            script.assert(transition);
        }
        let last = self.at(&mut script, self.invariant, k)?;
        script.assert(format!("(not {last})"));
        Ok(script)
    }
}

fn and(mut terms: Vec<String>) -> String {
    if terms.len() == 1 {
        return terms.remove(0);
    }
    format!("(and {})", terms.join(" "))
}

fn or(mut terms: Vec<String>) -> String {
    if terms.len() == 1 {
        return terms.remove(0);
    }
    format!("(or {})", terms.join(" "))
}
