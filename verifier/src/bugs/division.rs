//! Division and modulo by a possibly-zero divisor
//!
//! Every `/` and `%` in a function body is classified by its divisor after
//! simplification:
//!
//! - literal zero: error
//! - nonzero literal: nothing
//! - anything else: warning, unless an SMT session proves the divisor
//!   nonzero under the facts known at that point
//!
//! Facts are best-effort: preconditions, enclosing `if`/`while` conditions
//! (negated on `else` paths and for earlier arms of a chain), `for` ranges
//! and immutable bindings. A fact is dropped once any variable it mentions
//! may have been reassigned.

use std::collections::BTreeSet;

use crate::ast::{BinaryOp, BoundExpr, BoundFunction, BoundStmt, ExprKind, StmtKind, Type, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::simplify::{DEFAULT_MAX_ITERATIONS, ExpressionSimplifier, STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::smt::{SatResult, SmtScript, SmtSession};

use super::BugPatternChecker;

pub struct DivisionByZeroChecker<'s> {
    simplifier: ExpressionSimplifier,
    max_iterations: usize,
    session: Option<&'s SmtSession<'s>>,
}

impl Default for DivisionByZeroChecker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> DivisionByZeroChecker<'s> {
    pub fn new() -> Self {
        Self {
            simplifier: ExpressionSimplifier::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            session: None,
        }
    }

    /// Discharge warnings with the solver when a session is given
    pub fn with_session(mut self, session: Option<&'s SmtSession<'s>>) -> Self {
        self.session = session;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Ask the solver whether `facts && divisor == 0` is unsatisfiable
    fn proven_nonzero(&self, divisor: &BoundExpr, facts: &[BoundExpr]) -> bool {
        let Some(session) = self.session else {
            return false;
        };

        let mut script = SmtScript::new();
        for fact in facts {
            if let Err(err) = script.assert_expr(fact) {
                tracing::trace!(error = %err, "dropping fact");
            }
        }
        let zero = BoundExpr::int(0, divisor.span);
        let query = BoundExpr::binary(BinaryOp::Eq, divisor.clone(), zero, divisor.span);
        if let Err(err) = script.assert_expr(&query) {
            tracing::debug!(error = %err, "divisor not encodable");
            return false;
        }

        session.check(&script) == SatResult::Unsat
    }
}

impl BugPatternChecker for DivisionByZeroChecker<'_> {
    fn name(&self) -> &'static str {
        "division-by-zero"
    }

    fn check(&self, function: &BoundFunction, sink: &DiagnosticSink) -> usize {
        let mut walker = Walker {
            checker: self,
            sink,
            found: 0,
        };
        let mut facts: Vec<BoundExpr> = function.preconditions.iter().map(|c| c.condition.clone()).collect();
        walker.stmts(&function.body, &mut facts);
        walker.found
    }
}

/// Names bound anywhere in `stmts`, including loop variables
fn assigned_names(stmts: &[BoundStmt]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_assigned(stmts, &mut names);
    names
}

fn collect_assigned(stmts: &[BoundStmt], names: &mut BTreeSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Bind { name, .. } => {
                names.insert(name.clone());
            }
            StmtKind::For { var, .. } => {
                names.insert(var.clone());
            }
            _ => {}
        }
        for nested in stmt.nested() {
            collect_assigned(nested, names);
        }
    }
}

fn kill(facts: &mut Vec<BoundExpr>, names: &BTreeSet<String>) {
    if names.is_empty() {
        return;
    }
    facts.retain(|fact| fact.free_vars().is_disjoint(names));
}

fn negate(expr: &BoundExpr) -> BoundExpr {
    BoundExpr::unary(UnaryOp::Not, expr.clone(), expr.span)
}

fn with_fact(facts: &[BoundExpr], fact: BoundExpr) -> Vec<BoundExpr> {
    let mut out = facts.to_vec();
    out.push(fact);
    out
}

struct Walker<'c, 's> {
    checker: &'c DivisionByZeroChecker<'s>,
    sink: &'c DiagnosticSink,
    found: usize,
}

impl Walker<'_, '_> {
    fn stmts(&mut self, stmts: &[BoundStmt], facts: &mut Vec<BoundExpr>) {
        for stmt in stmts {
            self.stmt(stmt, facts);
        }
    }

    fn stmt(&mut self, stmt: &BoundStmt, facts: &mut Vec<BoundExpr>) {
        match &stmt.kind {
            StmtKind::Bind {
                name,
                ty,
                mutable,
                declaration,
                value,
            } => {
                if let Some(value) = value {
                    self.expr(value, facts);
                }
                kill(facts, &BTreeSet::from([name.clone()]));
                if let (false, true, Some(value)) = (*mutable, *declaration, value) {
                    if !value.mentions(name) {
                        let var = BoundExpr::var(name.clone(), ty.clone(), stmt.span);
                        facts.push(BoundExpr::binary(BinaryOp::Eq, var, value.clone(), stmt.span));
                    }
                }
            }

            StmtKind::If { branches, else_body } => {
                let mut prior = facts.clone();
                for branch in branches {
                    self.expr(&branch.condition, &prior);
                    let mut branch_facts = with_fact(&prior, branch.condition.clone());
                    self.stmts(&branch.body, &mut branch_facts);
                    prior.push(negate(&branch.condition));
                }
                if let Some(else_body) = else_body {
                    self.stmts(else_body, &mut prior);
                }
                kill(facts, &assigned_names(std::slice::from_ref(stmt)));
            }

            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
                ..
            } => {
                self.expr(start, facts);
                self.expr(end, facts);
                if let Some(step) = step {
                    self.expr(step, facts);
                }

                let mut changed = assigned_names(body);
                changed.insert(var.clone());
                let mut loop_facts = facts.clone();
                kill(&mut loop_facts, &changed);

                let counter = BoundExpr::var(var.clone(), Type::Int, stmt.span);
                let descending = step.as_ref().and_then(|s| s.as_int()).is_some_and(|s| s < 0);
                let (from_op, to_op) = if descending {
                    (BinaryOp::Le, BinaryOp::Gt)
                } else {
                    (BinaryOp::Ge, BinaryOp::Lt)
                };
                let unknown_step = step.as_ref().is_some_and(|s| s.as_int().is_none());
                if !unknown_step {
                    loop_facts.push(BoundExpr::binary(from_op, counter.clone(), start.clone(), stmt.span));
                    loop_facts.push(BoundExpr::binary(to_op, counter, end.clone(), stmt.span));
                }

                self.stmts(body, &mut loop_facts);
                kill(facts, &changed);
            }

            StmtKind::While { condition, body, .. } => {
                let changed = assigned_names(body);
                let mut loop_facts = facts.clone();
                kill(&mut loop_facts, &changed);
                self.expr(condition, &loop_facts);
                loop_facts.push(condition.clone());
                self.stmts(body, &mut loop_facts);

                kill(facts, &changed);
                facts.push(negate(condition));
            }

            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value, facts);
                }
            }

            StmtKind::Call(expr) => self.expr(expr, facts),

            StmtKind::Block(inner) => {
                let mut block_facts = facts.clone();
                self.stmts(inner, &mut block_facts);
                kill(facts, &assigned_names(inner));
            }
        }
    }

    fn expr(&mut self, expr: &BoundExpr, facts: &[BoundExpr]) {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expr_inner(expr, facts))
    }

    fn expr_inner(&mut self, expr: &BoundExpr, facts: &[BoundExpr]) {
        match &expr.kind {
            ExprKind::Binary { op, left, right } if op.is_division() => {
                self.expr(left, facts);
                self.expr(right, facts);
                self.check_division(expr, *op, right, facts);
            }
            // Short-circuit operators guard their right operand
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                self.expr(left, facts);
                self.expr(right, &with_fact(facts, (**left).clone()));
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                self.expr(left, facts);
                self.expr(right, &with_fact(facts, negate(left)));
            }
            ExprKind::Implies { antecedent, consequent } => {
                self.expr(antecedent, facts);
                self.expr(consequent, &with_fact(facts, (**antecedent).clone()));
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expr(cond, facts);
                self.expr(then_expr, &with_fact(facts, (**cond).clone()));
                self.expr(else_expr, &with_fact(facts, negate(cond)));
            }
            ExprKind::Forall { vars, body } | ExprKind::Exists { vars, body } => {
                let bound: BTreeSet<String> = vars.iter().map(|v| v.name.clone()).collect();
                let mut inner = facts.to_vec();
                kill(&mut inner, &bound);
                self.expr(body, &inner);
            }
            _ => {
                for child in expr.children() {
                    self.expr(child, facts);
                }
            }
        }
    }

    fn check_division(&mut self, expr: &BoundExpr, op: BinaryOp, divisor: &BoundExpr, facts: &[BoundExpr]) {
        let what = if op == BinaryOp::Mod { "modulo" } else { "division" };
        let divisor = self
            .checker
            .simplifier
            .simplify_to_fixed_point(divisor, self.checker.max_iterations)
            .expr;

        if divisor.is_zero_literal() {
            self.report(Diagnostic::error(
                DiagnosticCode::DivisionByZero,
                format!("{what} by zero: divisor `{divisor}` is always zero"),
                expr.span,
            ));
            return;
        }
        if divisor.is_literal() {
            return;
        }
        if self.checker.proven_nonzero(&divisor, facts) {
            tracing::debug!(divisor = %divisor, "divisor proven nonzero");
            return;
        }
        self.report(Diagnostic::warning(
            DiagnosticCode::DivisionByZero,
            format!("possible {what} by zero: divisor `{divisor}` is not proven nonzero"),
            expr.span,
        ));
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.sink.report(diagnostic);
        self.found += 1;
    }
}
