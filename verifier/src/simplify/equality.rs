//! Structural equality of bound expressions
//!
//! Spans and attached types are ignored. Operands of commutative operators
//! (`+ * && || == !=`) compare modulo order, so `a + b` equals `b + a`.

use crate::ast::{BoundExpr, ExprKind, UnaryOp};

use super::{STACK_GROW_SIZE, STACK_RED_ZONE};

pub fn structurally_equal(a: &BoundExpr, b: &BoundExpr) -> bool {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || equal_inner(a, b))
}

/// `a` is `!b`
pub fn is_negation_of(a: &BoundExpr, b: &BoundExpr) -> bool {
    match &a.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => structurally_equal(operand, b),
        _ => false,
    }
}

fn all_equal(a: &[BoundExpr], b: &[BoundExpr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structurally_equal(x, y))
}

fn equal_inner(a: &BoundExpr, b: &BoundExpr) -> bool {
    use ExprKind::*;

    match (&a.kind, &b.kind) {
        (IntLit(x), IntLit(y)) => x == y,
        // IEEE comparison: 0.0 equals -0.0, NaN equals nothing
        (FloatLit(x), FloatLit(y)) => x == y,
        (BoolLit(x), BoolLit(y)) => x == y,
        (StringLit(x), StringLit(y)) => x == y,
        (Var(x), Var(y)) => x == y,

        (Unary { op: o1, operand: x }, Unary { op: o2, operand: y }) => o1 == o2 && structurally_equal(x, y),

        (
            Binary {
                op: o1,
                left: l1,
                right: r1,
            },
            Binary {
                op: o2,
                left: l2,
                right: r2,
            },
        ) => {
            o1 == o2
                && ((structurally_equal(l1, l2) && structurally_equal(r1, r2))
                    || (o1.is_commutative() && structurally_equal(l1, r2) && structurally_equal(r1, l2)))
        }

        (
            Implies {
                antecedent: a1,
                consequent: c1,
            },
            Implies {
                antecedent: a2,
                consequent: c2,
            },
        ) => structurally_equal(a1, a2) && structurally_equal(c1, c2),

        (
            Conditional {
                cond: c1,
                then_expr: t1,
                else_expr: e1,
            },
            Conditional {
                cond: c2,
                then_expr: t2,
                else_expr: e2,
            },
        ) => structurally_equal(c1, c2) && structurally_equal(t1, t2) && structurally_equal(e1, e2),

        (Forall { vars: v1, body: b1 }, Forall { vars: v2, body: b2 })
        | (Exists { vars: v1, body: b1 }, Exists { vars: v2, body: b2 }) => v1 == v2 && structurally_equal(b1, b2),

        (
            Call {
                target: t1, args: a1, ..
            },
            Call {
                target: t2, args: a2, ..
            },
        ) => t1 == t2 && all_equal(a1, a2),

        (Index { base: b1, index: i1 }, Index { base: b2, index: i2 }) => {
            structurally_equal(b1, b2) && structurally_equal(i1, i2)
        }

        (Field { base: b1, field: f1 }, Field { base: b2, field: f2 }) => f1 == f2 && structurally_equal(b1, b2),

        (ArrayLit(x), ArrayLit(y)) | (Interpolation(x), Interpolation(y)) => all_equal(x, y),

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Span, Type};

    fn var(name: &str, start: usize) -> BoundExpr {
        BoundExpr::var(name, Type::Int, Span::new(start, start + 1))
    }

    #[test]
    fn test_spans_are_ignored() {
        assert!(structurally_equal(&var("x", 0), &var("x", 40)));
        assert!(!structurally_equal(&var("x", 0), &var("y", 0)));
    }

    #[test]
    fn test_commutative_operands_reorder() {
        let sp = Span::default();
        let ab = BoundExpr::binary(BinaryOp::Add, var("a", 0), var("b", 2), sp);
        let ba = BoundExpr::binary(BinaryOp::Add, var("b", 5), var("a", 7), sp);
        assert!(structurally_equal(&ab, &ba));

        let eq_ab = BoundExpr::binary(BinaryOp::Eq, var("a", 0), var("b", 2), sp);
        let eq_ba = BoundExpr::binary(BinaryOp::Eq, var("b", 0), var("a", 2), sp);
        assert!(structurally_equal(&eq_ab, &eq_ba));
    }

    #[test]
    fn test_non_commutative_operands_do_not_reorder() {
        let sp = Span::default();
        let ab = BoundExpr::binary(BinaryOp::Sub, var("a", 0), var("b", 2), sp);
        let ba = BoundExpr::binary(BinaryOp::Sub, var("b", 0), var("a", 2), sp);
        assert!(!structurally_equal(&ab, &ba));

        let lt = BoundExpr::binary(BinaryOp::Lt, var("a", 0), var("b", 2), sp);
        let lt_rev = BoundExpr::binary(BinaryOp::Lt, var("b", 0), var("a", 2), sp);
        assert!(!structurally_equal(&lt, &lt_rev));
    }

    #[test]
    fn test_signed_zero_literals_equal() {
        let sp = Span::default();
        assert!(structurally_equal(&BoundExpr::float(0.0, sp), &BoundExpr::float(-0.0, sp)));
        assert!(!structurally_equal(&BoundExpr::float(0.0, sp), &BoundExpr::int(0, sp)));
    }

    #[test]
    fn test_negation() {
        let sp = Span::default();
        let p = BoundExpr::var("p", Type::Bool, sp);
        let not_p = BoundExpr::not(p.clone(), sp);
        assert!(is_negation_of(&not_p, &p));
        assert!(!is_negation_of(&p, &not_p));
    }
}
