//! Loop invariant synthesis and declared-invariant checking
//!
//! Every counting loop gets one candidate invariant bounding its variable on
//! the side it moves towards; the loop bound plus one step of overshoot.
//! Candidates and declared invariants are handed to k-induction.

use std::collections::BTreeSet;

use crate::ast::{BinaryOp, BoundContract, BoundExpr, BoundStmt, ExprKind, Span, StmtKind, Type, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::kinduction::{KInductionEngine, KInductionResult};
use crate::loops::{LoopConditionAnalyzer, LoopShape};

pub(crate) struct InvariantChecker<'e, 's> {
    engine: &'e KInductionEngine<'s>,
    analyzer: LoopConditionAnalyzer,
    sink: &'e DiagnosticSink,
}

impl<'e, 's> InvariantChecker<'e, 's> {
    pub(crate) fn new(engine: &'e KInductionEngine<'s>, sink: &'e DiagnosticSink) -> Self {
        Self {
            engine,
            analyzer: LoopConditionAnalyzer::new(),
            sink,
        }
    }

    /// Check every loop in `body`; returns how many invariants were proven
    pub(crate) fn check(&self, body: &[BoundStmt]) -> usize {
        let mut proven = 0;
        for (i, stmt) in body.iter().enumerate() {
            if let Some(shape) = self.shape(stmt) {
                let initial = initial_value(stmt, &body[..i], &shape);
                proven += self.check_loop(stmt, &shape, initial);
            }
            for nested in stmt.nested() {
                proven += self.check(nested);
            }
        }
        proven
    }

    /// The loop in normalized form, if its variable moves by a constant on
    /// every iteration
    fn shape(&self, stmt: &BoundStmt) -> Option<LoopShape> {
        match &stmt.kind {
            StmtKind::While { condition, body, .. } => {
                let info = self.analyzer.analyze(condition)?;
                if !info.is_analyzable() {
                    return None;
                }
                let variable = info.variable.as_deref()?;
                // The update must happen unconditionally and only once
                let top_level = body.iter().any(|s| binds(s, variable));
                if !top_level || assignment_count(body, variable) != 1 {
                    return None;
                }
                let transition = self.analyzer.analyze_transition(body, variable)?;
                transition.is_well_formed().then_some(LoopShape { info, transition })
            }
            StmtKind::For {
                var, end, step, body, ..
            } => {
                if assignment_count(body, var) != 0 {
                    return None;
                }
                let shape = self.analyzer.analyze_for(var, end, step.as_ref(), stmt.span)?;
                shape.info.is_analyzable().then_some(shape)
            }
            _ => None,
        }
    }

    fn check_loop(&self, stmt: &BoundStmt, shape: &LoopShape, initial: Option<i64>) -> usize {
        let mut proven = 0;

        if let Some(bound) = candidate(shape, stmt.span) {
            if let KInductionResult::Proven { k } =
                self.engine.prove(&shape.info, &shape.transition, &bound, initial)
            {
                tracing::debug!(invariant = %bound, k, entry_checked = initial.is_some(), "synthesized loop invariant");
                // Without a known entry value only the step case was checked
                let message = match initial {
                    Some(_) => format!("loop invariant `{bound}` holds (proven by {k}-induction)"),
                    None => format!("loop invariant `{bound}` is inductive (proven by {k}-induction, entry not checked)"),
                };
                self.sink.report(Diagnostic::info(DiagnosticCode::InvariantSynthesized, message, stmt.span));
                proven += 1;
            }
        }

        let (invariants, body) = match &stmt.kind {
            StmtKind::For { invariants, body, .. } | StmtKind::While { invariants, body, .. } => {
                (invariants.as_slice(), body.as_slice())
            }
            _ => return proven,
        };
        let variable = shape.transition.variable.as_str();
        for invariant in invariants {
            if !encodable(invariant, variable, body) {
                tracing::debug!(invariant = %invariant.condition, "declared invariant outside the loop model");
                continue;
            }
            match self
                .engine
                .prove(&shape.info, &shape.transition, &invariant.condition, initial)
            {
                KInductionResult::Proven { k } => {
                    tracing::debug!(invariant = %invariant.condition, k, "declared invariant proven");
                    proven += 1;
                }
                KInductionResult::Refuted => self.sink.report(Diagnostic::warning(
                    DiagnosticCode::InvariantNotProven,
                    format!("loop invariant `{}` does not hold on entry", invariant.condition),
                    invariant.span,
                )),
                KInductionResult::NotProven => self.sink.report(Diagnostic::warning(
                    DiagnosticCode::InvariantNotProven,
                    format!("loop invariant `{}` could not be proven", invariant.condition),
                    invariant.span,
                )),
            }
        }
        proven
    }
}

/// `v >= lower - d` when counting down, `v <= upper - 1 + d` when counting up
fn candidate(shape: &LoopShape, span: Span) -> Option<BoundExpr> {
    let delta = shape.transition.delta?;
    let variable = BoundExpr::var(shape.transition.variable.as_str(), Type::Int, span);
    let step = delta.checked_abs()?;
    let (op, bound) = if delta < 0 {
        (BinaryOp::Ge, shape.info.lower_bound?.checked_sub(step)?)
    } else if delta > 0 {
        (BinaryOp::Le, shape.info.upper_bound?.checked_sub(1)?.checked_add(step)?)
    } else {
        return None;
    };
    Some(BoundExpr::binary(op, variable, BoundExpr::int(bound, span), span))
}

/// The `for` start, or the nearest preceding literal bind of the variable
/// in the same statement list
fn initial_value(stmt: &BoundStmt, preceding: &[BoundStmt], shape: &LoopShape) -> Option<i64> {
    if let StmtKind::For { start, .. } = &stmt.kind {
        return literal(start);
    }
    let variable = shape.transition.variable.as_str();
    for earlier in preceding.iter().rev() {
        if let StmtKind::Bind { name, value, .. } = &earlier.kind {
            if name == variable {
                return value.as_ref().and_then(literal);
            }
        }
        if assignment_count(std::slice::from_ref(earlier), variable) > 0 {
            return None;
        }
    }
    None
}

fn literal(expr: &BoundExpr) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntLit(n) => Some(*n),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => operand.as_int().map(i64::wrapping_neg),
        _ => None,
    }
}

fn binds(stmt: &BoundStmt, variable: &str) -> bool {
    matches!(&stmt.kind, StmtKind::Bind { name, .. } if name == variable)
}

/// Binds to `variable` anywhere in `stmts`, nested statements included
fn assignment_count(stmts: &[BoundStmt], variable: &str) -> usize {
    stmts
        .iter()
        .map(|stmt| {
            let own = usize::from(binds(stmt, variable));
            let nested: usize = stmt.nested().iter().map(|b| assignment_count(b, variable)).sum();
            own + nested
        })
        .sum()
}

/// A declared invariant fits the loop model when every variable other than
/// the loop variable stays fixed across iterations
fn encodable(invariant: &BoundContract, variable: &str, body: &[BoundStmt]) -> bool {
    let vars: BTreeSet<String> = invariant.condition.free_vars();
    vars.iter()
        .filter(|v| v.as_str() != variable)
        .all(|v| assignment_count(body, v) == 0)
}
