//! Loop condition and transition analysis
//!
//! Recognizes bounded counting loops: a guard comparing the loop variable
//! against a literal, and a body that moves the variable by a constant.
//! Bounds use one convention throughout: `lower_bound` is inclusive and
//! `upper_bound` is exclusive, so `i <= 9` and `i < 10` both give upper 10.

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, BoundExpr, BoundStmt, ExprKind, Span, StmtKind, Type, UnaryOp};

/// One recognized guard conjunct, normalized to `variable op bound`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopGuard {
    pub op: BinaryOp,
    pub bound: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhileLoopInfo {
    pub variable: Option<String>,
    /// Inclusive
    pub lower_bound: Option<i64>,
    /// Exclusive
    pub upper_bound: Option<i64>,
    pub is_decrementing: bool,
    /// Comparison operator(s) as written, after normalizing the variable to
    /// the left, e.g. `<` or `< && >=`
    pub operator: String,
    /// Per-iteration step, known for counting `for` loops
    pub step: Option<i64>,
    /// Guards over the loop variable with literal bounds
    pub guards: Vec<LoopGuard>,
}

impl WhileLoopInfo {
    pub fn is_analyzable(&self) -> bool {
        self.variable.is_some() && (self.lower_bound.is_some() || self.upper_bound.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    AddConstant,
    SubConstant,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInfo {
    pub variable: String,
    pub kind: TransitionKind,
    /// Signed per-iteration change (`i - 1` gives -1)
    pub delta: Option<i64>,
}

impl TransitionInfo {
    pub fn constant(variable: impl Into<String>, delta: i64) -> Self {
        let kind = if delta < 0 {
            TransitionKind::SubConstant
        } else {
            TransitionKind::AddConstant
        };
        Self {
            variable: variable.into(),
            kind,
            delta: Some(delta),
        }
    }

    pub fn unknown(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            kind: TransitionKind::Unknown,
            delta: None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.kind != TransitionKind::Unknown && self.delta.is_some()
    }
}

/// A counting loop in normalized form: what the guard says and how the
/// variable moves
#[derive(Debug, Clone)]
pub struct LoopShape {
    pub info: WhileLoopInfo,
    pub transition: TransitionInfo,
}

/// Literal integer, allowing a negated literal
fn literal_int(expr: &BoundExpr) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntLit(n) => Some(*n),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => operand.as_int().map(i64::wrapping_neg),
        _ => None,
    }
}

struct Guard<'a> {
    variable: &'a str,
    op: BinaryOp,
    /// `None` when compared against a non-literal
    constant: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopConditionAnalyzer;

impl LoopConditionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Recognize `v op k` guards and conjunctions of two of them
    pub fn analyze(&self, condition: &BoundExpr) -> Option<WhileLoopInfo> {
        match &condition.kind {
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let first = Self::guard(left)?;
                let second = Self::guard(right)?;
                Some(Self::combine(&[first, second]))
            }
            ExprKind::Binary { .. } => {
                let guard = Self::guard(condition)?;
                Some(Self::combine(&[guard]))
            }
            _ => None,
        }
    }

    fn guard(expr: &BoundExpr) -> Option<Guard<'_>> {
        let ExprKind::Binary { op, left, right } = &expr.kind else {
            return None;
        };
        if !matches!(
            op,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Ne
        ) {
            return None;
        }

        if let Some(variable) = left.as_var() {
            return Some(Guard {
                variable,
                op: *op,
                constant: literal_int(right),
            });
        }
        // 10 > i  is  i < 10
        let variable = right.as_var()?;
        let constant = literal_int(left)?;
        Some(Guard {
            variable,
            op: op.flip()?,
            constant: Some(constant),
        })
    }

    fn combine(guards: &[Guard<'_>]) -> WhileLoopInfo {
        let variable = guards[0].variable;
        let mut lower_bound: Option<i64> = None;
        let mut upper_bound: Option<i64> = None;
        let mut normalized = Vec::new();

        for guard in guards.iter().filter(|g| g.variable == variable) {
            let Some(k) = guard.constant else { continue };
            normalized.push(LoopGuard { op: guard.op, bound: k });
            match guard.op {
                BinaryOp::Lt | BinaryOp::Ne => upper_bound = Some(upper_bound.map_or(k, |u| u.min(k))),
                BinaryOp::Le => {
                    let k = k.saturating_add(1);
                    upper_bound = Some(upper_bound.map_or(k, |u| u.min(k)));
                }
                BinaryOp::Gt => {
                    let k = k.saturating_add(1);
                    lower_bound = Some(lower_bound.map_or(k, |l| l.max(k)));
                }
                BinaryOp::Ge => lower_bound = Some(lower_bound.map_or(k, |l| l.max(k))),
                _ => {}
            }
        }

        // Direction comes from the loop variable's own guards only
        let own = || guards.iter().filter(|g| g.variable == variable);
        let counts_down = own().any(|g| matches!(g.op, BinaryOp::Gt | BinaryOp::Ge));
        let counts_up = own().any(|g| matches!(g.op, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Ne));

        let operator = guards.iter().map(|g| g.op.symbol()).collect::<Vec<_>>().join(" && ");

        WhileLoopInfo {
            variable: Some(variable.to_string()),
            lower_bound,
            upper_bound,
            is_decrementing: counts_down && !counts_up,
            operator,
            step: None,
            guards: normalized,
        }
    }

    /// Find how `var` changes per iteration: the first bind to it, searching
    /// nested `if` branches and blocks in order
    pub fn analyze_transition(&self, body: &[BoundStmt], var: &str) -> Option<TransitionInfo> {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Bind { name, value, .. } if name == var => {
                    return Some(
                        value
                            .as_ref()
                            .and_then(|v| Self::constant_step(v, var))
                            .map(|delta| TransitionInfo::constant(var, delta))
                            .unwrap_or_else(|| TransitionInfo::unknown(var)),
                    );
                }
                StmtKind::If { branches, else_body } => {
                    for branch in branches {
                        if let Some(found) = self.analyze_transition(&branch.body, var) {
                            return Some(found);
                        }
                    }
                    if let Some(found) = else_body.as_ref().and_then(|b| self.analyze_transition(b, var)) {
                        return Some(found);
                    }
                }
                StmtKind::Block(inner) => {
                    if let Some(found) = self.analyze_transition(inner, var) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// `var + k`, `k + var` or `var - k`
    fn constant_step(value: &BoundExpr, var: &str) -> Option<i64> {
        let ExprKind::Binary { op, left, right } = &value.kind else {
            return None;
        };
        match op {
            BinaryOp::Add if left.as_var() == Some(var) => literal_int(right),
            BinaryOp::Add if right.as_var() == Some(var) => literal_int(left),
            BinaryOp::Sub if left.as_var() == Some(var) => literal_int(right).map(i64::wrapping_neg),
            _ => None,
        }
    }

    /// Normalize `for var in start..end (by step)`: guard `var < end` (or
    /// `var > end` for a negative literal step), transition `var + step`.
    pub fn analyze_for(
        &self,
        var: &str,
        end: &BoundExpr,
        step: Option<&BoundExpr>,
        span: Span,
    ) -> Option<LoopShape> {
        let delta = match step {
            None => 1,
            Some(step) => literal_int(step)?,
        };
        let op = if delta < 0 { BinaryOp::Gt } else { BinaryOp::Lt };
        let guard = BoundExpr::binary(op, BoundExpr::var(var, Type::Int, span), end.clone(), span);
        let mut info = self.analyze(&guard)?;
        info.step = Some(delta);
        Some(LoopShape {
            info,
            transition: TransitionInfo::constant(var, delta),
        })
    }
}
