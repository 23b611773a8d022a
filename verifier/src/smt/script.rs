//! SMT-LIB2 script builder and bound-expression translation
//!
//! Only the quantifier-free linear integer and boolean fragment is encoded.
//! Floats, strings, calls, bitwise operators and quantifiers are rejected
//! with [`SmtError::Unsupported`]; callers drop the fact or give up on the
//! query.

use std::collections::HashMap;
use std::fmt::Write;

use crate::ast::{BinaryOp, BoundExpr, ExprKind, Type, UnaryOp};
use crate::error::SmtError;
use crate::simplify::{STACK_GROW_SIZE, STACK_RED_ZONE};

/// SMT-LIB2 sorts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtSort {
    Int,
    Bool,
}

impl SmtSort {
    pub fn to_smt(self) -> &'static str {
        match self {
            SmtSort::Int => "Int",
            SmtSort::Bool => "Bool",
        }
    }

    fn of(ty: &Type) -> Option<SmtSort> {
        match ty {
            Type::Int | Type::Unknown => Some(SmtSort::Int),
            Type::Bool => Some(SmtSort::Bool),
            _ => None,
        }
    }
}

/// One satisfiability query: declarations, assertions, `(check-sat)`
#[derive(Debug, Clone)]
pub struct SmtScript {
    logic: String,
    declarations: Vec<(String, SmtSort)>,
    assertions: Vec<String>,
}

impl Default for SmtScript {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtScript {
    pub fn new() -> Self {
        Self {
            logic: "QF_LIA".to_string(), // Quantifier-Free Linear Integer Arithmetic
            declarations: Vec::new(),
            assertions: Vec::new(),
        }
    }

    /// Declare a constant; repeated declarations of the same name are ignored
    pub fn declare_const(&mut self, name: &str, sort: SmtSort) {
        let name = sanitize_name(name);
        if !self.declarations.iter().any(|(n, _)| *n == name) {
            self.declarations.push((name, sort));
        }
    }

    /// Add a raw SMT-LIB2 term as an assertion
    pub fn assert(&mut self, term: impl Into<String>) {
        self.assertions.push(format!("(assert {})", term.into()));
    }

    /// Translate and assert a bound expression, declaring its free variables
    pub fn assert_expr(&mut self, expr: &BoundExpr) -> Result<(), SmtError> {
        let term = self.translate(expr, &HashMap::new())?;
        self.assert(term);
        Ok(())
    }

    /// Translate a bound expression with some variables renamed (used to
    /// give each unrolled loop state its own copy of the loop variable).
    /// Free variables are declared under their final names.
    pub fn translate(&mut self, expr: &BoundExpr, renames: &HashMap<String, String>) -> Result<String, SmtError> {
        let mut vars = Vec::new();
        let term = Translator {
            renames,
            vars: &mut vars,
        }
        .expr(expr)?;
        for (name, sort) in vars {
            self.declare_const(&name, sort);
        }
        Ok(term)
    }

    pub fn assertion_count(&self) -> usize {
        self.assertions.len()
    }

    /// Render as an SMT-LIB2 script
    pub fn render(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "(set-logic {})", self.logic);
        for (name, sort) in &self.declarations {
            let _ = writeln!(output, "(declare-const {} {})", name, sort.to_smt());
        }
        for assertion in &self.assertions {
            let _ = writeln!(output, "{assertion}");
        }
        let _ = writeln!(output, "(check-sat)");
        output
    }
}

/// Translate an expression to an SMT-LIB2 term without renaming
pub fn translate_expr(expr: &BoundExpr) -> Result<String, SmtError> {
    let mut vars = Vec::new();
    Translator {
        renames: &HashMap::new(),
        vars: &mut vars,
    }
    .expr(expr)
}

/// SMT-LIB2 symbols: alphanumerics and `_`, not starting with a digit
pub fn sanitize_name(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

fn int_literal(n: i64) -> String {
    if n >= 0 {
        n.to_string()
    } else {
        format!("(- {})", n.unsigned_abs())
    }
}

struct Translator<'a> {
    renames: &'a HashMap<String, String>,
    vars: &'a mut Vec<(String, SmtSort)>,
}

impl Translator<'_> {
    fn expr(&mut self, expr: &BoundExpr) -> Result<String, SmtError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expr_inner(expr))
    }

    fn expr_inner(&mut self, expr: &BoundExpr) -> Result<String, SmtError> {
        match &expr.kind {
            ExprKind::IntLit(n) => Ok(int_literal(*n)),
            ExprKind::BoolLit(b) => Ok(b.to_string()),

            ExprKind::Var(name) => {
                let sort = SmtSort::of(&expr.ty)
                    .ok_or_else(|| SmtError::unsupported(format!("variable '{name}' of type {}", expr.ty), expr.span))?;
                let symbol = match self.renames.get(name) {
                    Some(renamed) => sanitize_name(renamed),
                    None => sanitize_name(name),
                };
                if !self.vars.iter().any(|(n, _)| *n == symbol) {
                    self.vars.push((symbol.clone(), sort));
                }
                Ok(symbol)
            }

            ExprKind::Unary { op, operand } => {
                let e = self.expr(operand)?;
                match op {
                    UnaryOp::Neg => Ok(format!("(- {e})")),
                    UnaryOp::Not => Ok(format!("(not {e})")),
                    UnaryOp::BitNot => Err(SmtError::unsupported("bitwise not", expr.span)),
                }
            }

            ExprKind::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let op_str = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "div",
                    BinaryOp::Mod => "mod",
                    BinaryOp::Eq => "=",
                    BinaryOp::Ne => return Ok(format!("(not (= {l} {r}))")),
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "and",
                    BinaryOp::Or => "or",
                    BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                        return Err(SmtError::unsupported(format!("operator {op}"), expr.span));
                    }
                };
                Ok(format!("({op_str} {l} {r})"))
            }

            ExprKind::Implies { antecedent, consequent } => {
                let a = self.expr(antecedent)?;
                let c = self.expr(consequent)?;
                Ok(format!("(=> {a} {c})"))
            }

            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.expr(cond)?;
                let t = self.expr(then_expr)?;
                let e = self.expr(else_expr)?;
                Ok(format!("(ite {c} {t} {e})"))
            }

            ExprKind::FloatLit(_) => Err(SmtError::unsupported("float literal", expr.span)),
            ExprKind::StringLit(_) | ExprKind::Interpolation(_) => {
                Err(SmtError::unsupported("string value", expr.span))
            }
            ExprKind::Forall { .. } | ExprKind::Exists { .. } => {
                Err(SmtError::unsupported("quantifier", expr.span))
            }
            ExprKind::Call { target, .. } => Err(SmtError::unsupported(format!("call to '{target}'"), expr.span)),
            ExprKind::Index { .. } | ExprKind::Field { .. } | ExprKind::ArrayLit(_) => {
                Err(SmtError::unsupported("aggregate access", expr.span))
            }
        }
    }
}
