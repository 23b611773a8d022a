//! Rewrite rules, applied to a node whose children are already simplified
//!
//! Families run in priority order; the first one that fires wins.

use crate::ast::{BinaryOp, BoundExpr, ExprKind, Span, Type, UnaryOp};

use super::equality::{is_negation_of, structurally_equal};
use super::{Observation, ObservationKind};

pub(super) fn apply(expr: &BoundExpr, observations: &mut Vec<Observation>) -> Option<BoundExpr> {
    fold_constants(expr)
        .or_else(|| algebraic_identity(expr))
        .or_else(|| boolean_identity(expr))
        .or_else(|| redundancy(expr))
        .or_else(|| tautology(expr, observations))
        .or_else(|| implication(expr))
        .or_else(|| de_morgan(expr))
        .or_else(|| conditional(expr))
        .or_else(|| quantifier(expr))
}

fn zero_of(ty: &Type, span: Span) -> BoundExpr {
    match ty {
        Type::Float => BoundExpr::float(0.0, span),
        _ => BoundExpr::int(0, span),
    }
}

fn one_of(ty: &Type, span: Span) -> BoundExpr {
    match ty {
        Type::Float => BoundExpr::float(1.0, span),
        _ => BoundExpr::int(1, span),
    }
}

fn is_one(expr: &BoundExpr) -> bool {
    match expr.kind {
        ExprKind::IntLit(n) => n == 1,
        ExprKind::FloatLit(x) => x == 1.0,
        _ => false,
    }
}

// ============================================================================
// Constant folding
// ============================================================================

fn fold_constants(expr: &BoundExpr) -> Option<BoundExpr> {
    let span = expr.span;
    match &expr.kind {
        ExprKind::Unary { op, operand } => match (op, &operand.kind) {
            (UnaryOp::Neg, ExprKind::IntLit(n)) => Some(BoundExpr::int(n.wrapping_neg(), span)),
            (UnaryOp::Neg, ExprKind::FloatLit(x)) => Some(BoundExpr::float(-x, span)),
            (UnaryOp::Not, ExprKind::BoolLit(b)) => Some(BoundExpr::boolean(!b, span)),
            (UnaryOp::BitNot, ExprKind::IntLit(n)) => Some(BoundExpr::int(!n, span)),
            _ => None,
        },
        ExprKind::Binary { op, left, right } => match (&left.kind, &right.kind) {
            (ExprKind::IntLit(a), ExprKind::IntLit(b)) => fold_int(*op, *a, *b, span),
            (ExprKind::FloatLit(a), ExprKind::FloatLit(b)) => fold_float(*op, *a, *b, span),
            (ExprKind::IntLit(a), ExprKind::FloatLit(b)) => fold_float(*op, *a as f64, *b, span),
            (ExprKind::FloatLit(a), ExprKind::IntLit(b)) => fold_float(*op, *a, *b as f64, span),
            (ExprKind::BoolLit(a), ExprKind::BoolLit(b)) => fold_bool(*op, *a, *b, span),
            (ExprKind::StringLit(a), ExprKind::StringLit(b)) => match op {
                BinaryOp::Eq => Some(BoundExpr::boolean(a == b, span)),
                BinaryOp::Ne => Some(BoundExpr::boolean(a != b, span)),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn fold_int(op: BinaryOp, a: i64, b: i64, span: Span) -> Option<BoundExpr> {
    let int = |n: i64| Some(BoundExpr::int(n, span));
    let boolean = |v: bool| Some(BoundExpr::boolean(v, span));

    match op {
        BinaryOp::Add => int(a.wrapping_add(b)),
        BinaryOp::Sub => int(a.wrapping_sub(b)),
        BinaryOp::Mul => int(a.wrapping_mul(b)),
        // Division by a literal zero is left for the bug checker to report
        BinaryOp::Div | BinaryOp::Mod if b == 0 => None,
        BinaryOp::Div => int(a.wrapping_div(b)),
        BinaryOp::Mod => int(a.wrapping_rem(b)),
        BinaryOp::BitAnd => int(a & b),
        BinaryOp::BitOr => int(a | b),
        BinaryOp::BitXor => int(a ^ b),
        BinaryOp::Shl => int(a.wrapping_shl((b & 63) as u32)),
        BinaryOp::Shr => int(a.wrapping_shr((b & 63) as u32)),
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::Le => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::Ge => boolean(a >= b),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

fn fold_float(op: BinaryOp, a: f64, b: f64, span: Span) -> Option<BoundExpr> {
    let float = |x: f64| Some(BoundExpr::float(x, span));
    let boolean = |v: bool| Some(BoundExpr::boolean(v, span));

    match op {
        BinaryOp::Add => float(a + b),
        BinaryOp::Sub => float(a - b),
        BinaryOp::Mul => float(a * b),
        // `b == 0.0` also holds for -0.0
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => None,
        BinaryOp::Div => float(a / b),
        BinaryOp::Mod => float(a % b),
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::Le => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::Ge => boolean(a >= b),
        _ => None,
    }
}

fn fold_bool(op: BinaryOp, a: bool, b: bool, span: Span) -> Option<BoundExpr> {
    let value = match op {
        BinaryOp::And => a && b,
        BinaryOp::Or => a || b,
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        _ => return None,
    };
    Some(BoundExpr::boolean(value, span))
}

// ============================================================================
// Algebraic and boolean identities
// ============================================================================

fn algebraic_identity(expr: &BoundExpr) -> Option<BoundExpr> {
    let ExprKind::Binary { op, left, right } = &expr.kind else {
        return None;
    };
    if expr.ty == Type::Str {
        return None;
    }

    // An operand may only stand in for the node when it has the node's type
    let keep = |operand: &BoundExpr| (operand.ty == expr.ty).then(|| operand.clone());

    match op {
        BinaryOp::Add if right.is_zero_literal() => keep(left),
        BinaryOp::Add if left.is_zero_literal() => keep(right),
        BinaryOp::Sub if right.is_zero_literal() => keep(left),
        BinaryOp::Mul if is_one(right) => keep(left),
        BinaryOp::Mul if is_one(left) => keep(right),
        BinaryOp::Mul if left.is_zero_literal() || right.is_zero_literal() => Some(zero_of(&expr.ty, expr.span)),
        BinaryOp::Div if is_one(right) => keep(left),
        BinaryOp::Div if left.is_literal() && !left.is_zero_literal() && structurally_equal(left, right) => {
            Some(one_of(&expr.ty, expr.span))
        }
        BinaryOp::Mod if right.as_int() == Some(1) => Some(BoundExpr::int(0, expr.span)),
        _ => None,
    }
}

fn boolean_identity(expr: &BoundExpr) -> Option<BoundExpr> {
    let span = expr.span;
    match &expr.kind {
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => match (left.as_bool(), right.as_bool()) {
            (Some(true), _) => Some((**right).clone()),
            (_, Some(true)) => Some((**left).clone()),
            (Some(false), _) | (_, Some(false)) => Some(BoundExpr::boolean(false, span)),
            _ => None,
        },
        ExprKind::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => match (left.as_bool(), right.as_bool()) {
            (Some(false), _) => Some((**right).clone()),
            (_, Some(false)) => Some((**left).clone()),
            (Some(true), _) | (_, Some(true)) => Some(BoundExpr::boolean(true, span)),
            _ => None,
        },
        // !!x, -(-x), ~~x
        ExprKind::Unary { op, operand } => match &operand.kind {
            ExprKind::Unary {
                op: inner_op,
                operand: inner,
            } if inner_op == op => Some((**inner).clone()),
            _ => None,
        },
        _ => None,
    }
}

fn redundancy(expr: &BoundExpr) -> Option<BoundExpr> {
    let ExprKind::Binary { op, left, right } = &expr.kind else {
        return None;
    };
    if !matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Sub) {
        return None;
    }
    if !structurally_equal(left, right) {
        return None;
    }

    match op {
        BinaryOp::And | BinaryOp::Or => Some((**left).clone()),
        BinaryOp::Eq => Some(BoundExpr::boolean(true, expr.span)),
        BinaryOp::Ne => Some(BoundExpr::boolean(false, expr.span)),
        _ => Some(zero_of(&left.ty, expr.span)),
    }
}

// ============================================================================
// Tautologies, contradictions and implications
// ============================================================================

fn observe(observations: &mut Vec<Observation>, kind: ObservationKind, expr: &BoundExpr) {
    let description = match kind {
        ObservationKind::Tautology => format!("`{expr}` is always true"),
        ObservationKind::Contradiction => format!("`{expr}` is always false"),
    };
    observations.push(Observation {
        kind,
        span: expr.span,
        description,
    });
}

fn tautology(expr: &BoundExpr, observations: &mut Vec<Observation>) -> Option<BoundExpr> {
    match &expr.kind {
        ExprKind::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } if is_negation_of(left, right) || is_negation_of(right, left) => {
            observe(observations, ObservationKind::Tautology, expr);
            Some(BoundExpr::boolean(true, expr.span))
        }
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } if is_negation_of(left, right) || is_negation_of(right, left) => {
            observe(observations, ObservationKind::Contradiction, expr);
            Some(BoundExpr::boolean(false, expr.span))
        }
        ExprKind::Implies { antecedent, consequent } => {
            if structurally_equal(antecedent, consequent)
                || antecedent.as_bool() == Some(false)
                || consequent.as_bool() == Some(true)
            {
                observe(observations, ObservationKind::Tautology, expr);
                Some(BoundExpr::boolean(true, expr.span))
            } else if is_negation_of(antecedent, consequent) {
                // !p -> p  ==  p
                Some((**consequent).clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn implication(expr: &BoundExpr) -> Option<BoundExpr> {
    let ExprKind::Implies { antecedent, consequent } = &expr.kind else {
        return None;
    };
    if antecedent.as_bool() == Some(true) {
        Some((**consequent).clone())
    } else if consequent.as_bool() == Some(false) {
        Some(BoundExpr::not((**antecedent).clone(), expr.span))
    } else {
        None
    }
}

fn de_morgan(expr: &BoundExpr) -> Option<BoundExpr> {
    let ExprKind::Unary {
        op: UnaryOp::Not,
        operand,
    } = &expr.kind
    else {
        return None;
    };
    let ExprKind::Binary { op, left, right } = &operand.kind else {
        return None;
    };
    let dual = match op {
        BinaryOp::And => BinaryOp::Or,
        BinaryOp::Or => BinaryOp::And,
        _ => return None,
    };
    Some(BoundExpr::binary(
        dual,
        BoundExpr::not((**left).clone(), left.span),
        BoundExpr::not((**right).clone(), right.span),
        expr.span,
    ))
}

// ============================================================================
// Conditionals and quantifiers
// ============================================================================

fn conditional(expr: &BoundExpr) -> Option<BoundExpr> {
    let ExprKind::Conditional {
        cond,
        then_expr,
        else_expr,
    } = &expr.kind
    else {
        return None;
    };

    match cond.as_bool() {
        Some(true) => return Some((**then_expr).clone()),
        Some(false) => return Some((**else_expr).clone()),
        None => {}
    }
    if structurally_equal(then_expr, else_expr) {
        return Some((**then_expr).clone());
    }
    match (then_expr.as_bool(), else_expr.as_bool()) {
        (Some(true), Some(false)) => Some((**cond).clone()),
        (Some(false), Some(true)) => Some(BoundExpr::not((**cond).clone(), expr.span)),
        _ => None,
    }
}

fn quantifier(expr: &BoundExpr) -> Option<BoundExpr> {
    match &expr.kind {
        ExprKind::Forall { body, .. } | ExprKind::Exists { body, .. } => {
            body.as_bool().map(|b| BoundExpr::boolean(b, expr.span))
        }
        _ => None,
    }
}
