//! Bound expression nodes

use std::collections::BTreeSet;

use super::{Span, Type};
use serde::{Deserialize, Serialize};

/// A resolved expression: the node, its type and its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundExpr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

/// Variable bound by a quantifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantifiedVar {
    pub name: String,
    pub ty: Type,
}

impl QuantifiedVar {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLit(i64),
    /// Float literal
    FloatLit(f64),
    /// Boolean literal
    BoolLit(bool),
    /// String literal
    StringLit(String),

    /// Variable reference (parameter, local or `result`)
    Var(String),

    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
    },

    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },

    /// Logical implication: antecedent -> consequent
    Implies {
        antecedent: Box<BoundExpr>,
        consequent: Box<BoundExpr>,
    },

    /// Conditional: cond ? then_expr : else_expr
    Conditional {
        cond: Box<BoundExpr>,
        then_expr: Box<BoundExpr>,
        else_expr: Box<BoundExpr>,
    },

    /// Universal quantifier
    Forall {
        vars: Vec<QuantifiedVar>,
        body: Box<BoundExpr>,
    },

    /// Existential quantifier
    Exists {
        vars: Vec<QuantifiedVar>,
        body: Box<BoundExpr>,
    },

    /// Function call. `effects` are the callee's declared effects as
    /// resolved by the binder (empty for pure callees).
    Call {
        target: String,
        args: Vec<BoundExpr>,
        effects: Vec<String>,
    },

    /// Array indexing: base[index]
    Index {
        base: Box<BoundExpr>,
        index: Box<BoundExpr>,
    },

    /// Field access: base.field
    Field {
        base: Box<BoundExpr>,
        field: String,
    },

    /// Array literal
    ArrayLit(Vec<BoundExpr>),

    /// String interpolation; the parts are concatenated
    Interpolation(Vec<BoundExpr>),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    /// Operators whose operands may be reordered for equality purposes
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_division(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Mod)
    }

    /// Swap operand sides of a comparison: `a < b` is `b > a`
    pub fn flip(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Ge => Some(BinaryOp::Le),
            BinaryOp::Eq => Some(BinaryOp::Eq),
            BinaryOp::Ne => Some(BinaryOp::Ne),
            _ => None,
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Arithmetic negation (-)
    Neg,
    /// Logical not (!)
    Not,
    /// Bitwise complement (~)
    BitNot,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
        }
    }
}

impl BoundExpr {
    pub fn new(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn int(value: i64, span: Span) -> Self {
        Self::new(ExprKind::IntLit(value), Type::Int, span)
    }

    pub fn float(value: f64, span: Span) -> Self {
        Self::new(ExprKind::FloatLit(value), Type::Float, span)
    }

    pub fn boolean(value: bool, span: Span) -> Self {
        Self::new(ExprKind::BoolLit(value), Type::Bool, span)
    }

    pub fn string(value: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::StringLit(value.into()), Type::Str, span)
    }

    pub fn var(name: impl Into<String>, ty: Type, span: Span) -> Self {
        Self::new(ExprKind::Var(name.into()), ty, span)
    }

    pub fn unary(op: UnaryOp, operand: BoundExpr, span: Span) -> Self {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::BitNot => Type::Int,
            UnaryOp::Neg => operand.ty.clone(),
        };
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        )
    }

    pub fn not(operand: BoundExpr, span: Span) -> Self {
        Self::unary(UnaryOp::Not, operand, span)
    }

    /// Build a binary node, inferring the result type from the operator
    /// and operand types.
    pub fn binary(op: BinaryOp, left: BoundExpr, right: BoundExpr, span: Span) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            Type::Bool
        } else if left.ty == Type::Float || right.ty == Type::Float {
            Type::Float
        } else if op == BinaryOp::Add && (left.ty == Type::Str || right.ty == Type::Str) {
            Type::Str
        } else {
            left.ty.clone()
        };
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        )
    }

    pub fn implies(antecedent: BoundExpr, consequent: BoundExpr, span: Span) -> Self {
        Self::new(
            ExprKind::Implies {
                antecedent: Box::new(antecedent),
                consequent: Box::new(consequent),
            },
            Type::Bool,
            span,
        )
    }

    pub fn conditional(cond: BoundExpr, then_expr: BoundExpr, else_expr: BoundExpr, span: Span) -> Self {
        let ty = then_expr.ty.clone();
        Self::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            ty,
            span,
        )
    }

    pub fn forall(vars: Vec<QuantifiedVar>, body: BoundExpr, span: Span) -> Self {
        Self::new(
            ExprKind::Forall {
                vars,
                body: Box::new(body),
            },
            Type::Bool,
            span,
        )
    }

    pub fn exists(vars: Vec<QuantifiedVar>, body: BoundExpr, span: Span) -> Self {
        Self::new(
            ExprKind::Exists {
                vars,
                body: Box::new(body),
            },
            Type::Bool,
            span,
        )
    }

    pub fn call(
        target: impl Into<String>,
        args: Vec<BoundExpr>,
        effects: Vec<String>,
        ty: Type,
        span: Span,
    ) -> Self {
        Self::new(
            ExprKind::Call {
                target: target.into(),
                args,
                effects,
            },
            ty,
            span,
        )
    }

    pub fn index(base: BoundExpr, index: BoundExpr, ty: Type, span: Span) -> Self {
        Self::new(
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
            ty,
            span,
        )
    }

    pub fn field(base: BoundExpr, field: impl Into<String>, ty: Type, span: Span) -> Self {
        Self::new(
            ExprKind::Field {
                base: Box::new(base),
                field: field.into(),
            },
            ty,
            span,
        )
    }

    pub fn interpolation(parts: Vec<BoundExpr>, span: Span) -> Self {
        Self::new(ExprKind::Interpolation(parts), Type::Str, span)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            ExprKind::IntLit(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ExprKind::BoolLit(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::BoolLit(_) | ExprKind::StringLit(_)
        )
    }

    /// Integer `0` or float `0.0` / `-0.0`
    pub fn is_zero_literal(&self) -> bool {
        match self.kind {
            ExprKind::IntLit(n) => n == 0,
            ExprKind::FloatLit(f) => f == 0.0,
            _ => false,
        }
    }

    /// Direct sub-expressions, in evaluation order
    pub fn children(&self) -> Vec<&BoundExpr> {
        match &self.kind {
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::Var(_) => Vec::new(),
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Implies { antecedent, consequent } => vec![antecedent, consequent],
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![cond, then_expr, else_expr],
            ExprKind::Forall { body, .. } | ExprKind::Exists { body, .. } => vec![body],
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::Index { base, index } => vec![base, index],
            ExprKind::Field { base, .. } => vec![base],
            ExprKind::ArrayLit(elems) | ExprKind::Interpolation(elems) => elems.iter().collect(),
        }
    }

    /// Free variables of the expression (quantifier-bound names excluded)
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free_vars(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free_vars(&self, bound: &mut Vec<String>, out: &mut BTreeSet<String>) {
        match &self.kind {
            ExprKind::Var(name) => {
                if !bound.iter().any(|b| b == name) {
                    out.insert(name.clone());
                }
            }
            ExprKind::Forall { vars, body } | ExprKind::Exists { vars, body } => {
                let depth = bound.len();
                bound.extend(vars.iter().map(|v| v.name.clone()));
                body.collect_free_vars(bound, out);
                bound.truncate(depth);
            }
            _ => {
                for child in self.children() {
                    child.collect_free_vars(bound, out);
                }
            }
        }
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.free_vars().contains(name)
    }

    fn needs_parens(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Binary { .. } | ExprKind::Implies { .. } | ExprKind::Conditional { .. }
        )
    }

    fn fmt_operand(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.needs_parens() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn write_list(f: &mut std::fmt::Formatter<'_>, items: &[BoundExpr]) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Source-like rendering used in diagnostic messages
impl std::fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::IntLit(n) => write!(f, "{n}"),
            ExprKind::FloatLit(x) => write!(f, "{x:?}"),
            ExprKind::BoolLit(b) => write!(f, "{b}"),
            ExprKind::StringLit(s) => write!(f, "{s:?}"),
            ExprKind::Var(name) => write!(f, "{name}"),
            ExprKind::Unary { op, operand } => {
                write!(f, "{op}")?;
                operand.fmt_operand(f)
            }
            ExprKind::Binary { op, left, right } => {
                left.fmt_operand(f)?;
                write!(f, " {op} ")?;
                right.fmt_operand(f)
            }
            ExprKind::Implies { antecedent, consequent } => {
                antecedent.fmt_operand(f)?;
                write!(f, " -> ")?;
                consequent.fmt_operand(f)
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.fmt_operand(f)?;
                write!(f, " ? ")?;
                then_expr.fmt_operand(f)?;
                write!(f, " : ")?;
                else_expr.fmt_operand(f)
            }
            ExprKind::Forall { vars, body } | ExprKind::Exists { vars, body } => {
                let quantifier = if matches!(self.kind, ExprKind::Forall { .. }) {
                    "forall"
                } else {
                    "exists"
                };
                write!(f, "{quantifier} ")?;
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", v.name, v.ty)?;
                }
                write!(f, ". {body}")
            }
            ExprKind::Call { target, args, .. } => {
                write!(f, "{target}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Index { base, index } => {
                base.fmt_operand(f)?;
                write!(f, "[{index}]")
            }
            ExprKind::Field { base, field } => {
                base.fmt_operand(f)?;
                write!(f, ".{field}")
            }
            ExprKind::ArrayLit(elems) => {
                write!(f, "[")?;
                write_list(f, elems)?;
                write!(f, "]")
            }
            ExprKind::Interpolation(parts) => {
                write!(f, "concat(")?;
                write_list(f, parts)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::new(0, 1)
    }

    fn x() -> BoundExpr {
        BoundExpr::var("x", Type::Int, sp())
    }

    #[test]
    fn test_binary_type_inference() {
        let cmp = BoundExpr::binary(BinaryOp::Lt, x(), BoundExpr::int(1, sp()), sp());
        assert_eq!(cmp.ty, Type::Bool);

        let mixed = BoundExpr::binary(BinaryOp::Add, x(), BoundExpr::float(1.5, sp()), sp());
        assert_eq!(mixed.ty, Type::Float);

        let concat = BoundExpr::binary(
            BinaryOp::Add,
            BoundExpr::string("id=", sp()),
            x(),
            sp(),
        );
        assert_eq!(concat.ty, Type::Str);
    }

    #[test]
    fn test_display_parenthesizes_compound_operands() {
        let inner = BoundExpr::binary(BinaryOp::Ge, x(), BoundExpr::int(0, sp()), sp());
        let expr = BoundExpr::binary(BinaryOp::And, BoundExpr::boolean(true, sp()), inner, sp());
        assert_eq!(expr.to_string(), "true && (x >= 0)");
    }

    #[test]
    fn test_display_call_and_quantifier() {
        let call = BoundExpr::call("f", vec![x(), BoundExpr::int(2, sp())], vec![], Type::Int, sp());
        assert_eq!(call.to_string(), "f(x, 2)");

        let q = BoundExpr::forall(
            vec![QuantifiedVar::new("i", Type::Int)],
            BoundExpr::binary(
                BinaryOp::Ge,
                BoundExpr::var("i", Type::Int, sp()),
                BoundExpr::int(0, sp()),
                sp(),
            ),
            sp(),
        );
        assert_eq!(q.to_string(), "forall i: i64. i >= 0");
    }

    #[test]
    fn test_free_vars_excludes_quantified() {
        let body = BoundExpr::binary(
            BinaryOp::Lt,
            BoundExpr::var("i", Type::Int, sp()),
            BoundExpr::var("n", Type::Int, sp()),
            sp(),
        );
        let q = BoundExpr::exists(vec![QuantifiedVar::new("i", Type::Int)], body, sp());
        let vars = q.free_vars();
        assert!(vars.contains("n"));
        assert!(!vars.contains("i"));
        assert!(q.mentions("n"));
        assert!(!q.mentions("i"));
    }

    #[test]
    fn test_zero_literal_includes_negative_float_zero() {
        assert!(BoundExpr::int(0, sp()).is_zero_literal());
        assert!(BoundExpr::float(0.0, sp()).is_zero_literal());
        assert!(BoundExpr::float(-0.0, sp()).is_zero_literal());
        assert!(!BoundExpr::int(3, sp()).is_zero_literal());
        assert!(!x().is_zero_literal());
    }

    #[test]
    fn test_flip_comparison() {
        assert_eq!(BinaryOp::Lt.flip(), Some(BinaryOp::Gt));
        assert_eq!(BinaryOp::Ge.flip(), Some(BinaryOp::Le));
        assert_eq!(BinaryOp::Ne.flip(), Some(BinaryOp::Ne));
        assert_eq!(BinaryOp::Add.flip(), None);
    }
}
