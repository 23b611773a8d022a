//! Expression simplifier
//!
//! A pure bottom-up term rewriter over bound expressions. One call to
//! [`ExpressionSimplifier::simplify`] is exactly one pass: children are
//! simplified first, then the rule table runs once on the rebuilt node.
//! [`ExpressionSimplifier::simplify_to_fixed_point`] repeats passes until
//! nothing changes.
//!
//! The rewriter never folds `/` or `%` by a literal zero, so the
//! division-by-zero checker still sees those divisions.

mod equality;
mod rules;

pub use equality::{is_negation_of, structurally_equal};

use serde::Serialize;

use crate::ast::{BoundExpr, ExprKind, Span};

/// Stack growth thresholds for recursive walks over deep trees
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Default iteration cap for [`ExpressionSimplifier::simplify_to_fixed_point`].
/// Guards against an unanticipated rewrite cycle; rules are not expected to
/// need more than a couple of passes.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObservationKind {
    /// The sub-expression is always true
    Tautology,
    /// The sub-expression is always false
    Contradiction,
}

/// A tautology or contradiction detected while rewriting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub span: Span,
    pub description: String,
}

/// Result of simplification
#[derive(Debug, Clone)]
pub struct Simplified {
    pub expr: BoundExpr,
    pub changed: bool,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionSimplifier;

impl ExpressionSimplifier {
    pub fn new() -> Self {
        Self
    }

    /// One bottom-up pass
    pub fn simplify(&self, expr: &BoundExpr) -> Simplified {
        let mut pass = Pass::default();
        match pass.visit(expr) {
            Some(rewritten) => Simplified {
                expr: rewritten,
                changed: true,
                observations: pass.observations,
            },
            None => Simplified {
                expr: expr.clone(),
                changed: false,
                observations: pass.observations,
            },
        }
    }

    /// Repeat passes until one reports no change, at most `max_iterations`
    pub fn simplify_to_fixed_point(&self, expr: &BoundExpr, max_iterations: usize) -> Simplified {
        let mut current = self.simplify(expr);
        let mut iterations = 1;

        let mut last_changed = current.changed;
        while last_changed && iterations < max_iterations {
            let next = self.simplify(&current.expr);
            last_changed = next.changed;
            current.expr = next.expr;
            current.observations.extend(next.observations);
            iterations += 1;
        }

        if last_changed {
            tracing::debug!(iterations, "simplifier stopped at iteration cap");
        }
        current
    }
}

#[derive(Default)]
struct Pass {
    observations: Vec<Observation>,
}

impl Pass {
    /// Returns `None` when the node is unchanged
    fn visit(&mut self, expr: &BoundExpr) -> Option<BoundExpr> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.visit_inner(expr))
    }

    fn visit_inner(&mut self, expr: &BoundExpr) -> Option<BoundExpr> {
        let rebuilt = self.rebuild_children(expr);
        let current = rebuilt.as_ref().unwrap_or(expr);
        match rules::apply(current, &mut self.observations) {
            Some(rewritten) => Some(rewritten),
            None => rebuilt,
        }
    }

    fn visit_boxed(&mut self, expr: &BoundExpr) -> Option<Box<BoundExpr>> {
        self.visit(expr).map(Box::new)
    }

    fn visit_all(&mut self, exprs: &[BoundExpr]) -> Option<Vec<BoundExpr>> {
        let results: Vec<Option<BoundExpr>> = exprs.iter().map(|e| self.visit(e)).collect();
        if results.iter().all(Option::is_none) {
            return None;
        }
        Some(
            results
                .into_iter()
                .zip(exprs)
                .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
                .collect(),
        )
    }

    /// Rebuild `expr` with simplified children, or `None` if no child changed
    fn rebuild_children(&mut self, expr: &BoundExpr) -> Option<BoundExpr> {
        let kind = match &expr.kind {
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::Var(_) => return None,

            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: self.visit_boxed(operand)?,
            },

            ExprKind::Binary { op, left, right } => {
                let (l, r) = (self.visit_boxed(left), self.visit_boxed(right));
                if l.is_none() && r.is_none() {
                    return None;
                }
                ExprKind::Binary {
                    op: *op,
                    left: l.unwrap_or_else(|| left.clone()),
                    right: r.unwrap_or_else(|| right.clone()),
                }
            }

            ExprKind::Implies { antecedent, consequent } => {
                let (a, c) = (self.visit_boxed(antecedent), self.visit_boxed(consequent));
                if a.is_none() && c.is_none() {
                    return None;
                }
                ExprKind::Implies {
                    antecedent: a.unwrap_or_else(|| antecedent.clone()),
                    consequent: c.unwrap_or_else(|| consequent.clone()),
                }
            }

            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.visit_boxed(cond);
                let t = self.visit_boxed(then_expr);
                let e = self.visit_boxed(else_expr);
                if c.is_none() && t.is_none() && e.is_none() {
                    return None;
                }
                ExprKind::Conditional {
                    cond: c.unwrap_or_else(|| cond.clone()),
                    then_expr: t.unwrap_or_else(|| then_expr.clone()),
                    else_expr: e.unwrap_or_else(|| else_expr.clone()),
                }
            }

            // Bound variable lists are never rewritten
            ExprKind::Forall { vars, body } => ExprKind::Forall {
                vars: vars.clone(),
                body: self.visit_boxed(body)?,
            },
            ExprKind::Exists { vars, body } => ExprKind::Exists {
                vars: vars.clone(),
                body: self.visit_boxed(body)?,
            },

            ExprKind::Call { target, args, effects } => ExprKind::Call {
                target: target.clone(),
                args: self.visit_all(args)?,
                effects: effects.clone(),
            },

            ExprKind::Index { base, index } => {
                let (b, i) = (self.visit_boxed(base), self.visit_boxed(index));
                if b.is_none() && i.is_none() {
                    return None;
                }
                ExprKind::Index {
                    base: b.unwrap_or_else(|| base.clone()),
                    index: i.unwrap_or_else(|| index.clone()),
                }
            }

            ExprKind::Field { base, field } => ExprKind::Field {
                base: self.visit_boxed(base)?,
                field: field.clone(),
            },

            ExprKind::ArrayLit(elems) => ExprKind::ArrayLit(self.visit_all(elems)?),
            ExprKind::Interpolation(parts) => ExprKind::Interpolation(self.visit_all(parts)?),
        };

        Some(BoundExpr::new(kind, expr.ty.clone(), expr.span))
    }
}
