//! Bound statements and contracts

use super::{BoundExpr, Span, Type};
use serde::{Deserialize, Serialize};

/// A resolved statement with its source span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Variable binding or assignment.
    /// `declaration` is true for the first binding of a local (`let`),
    /// false for a re-assignment of an existing mutable variable.
    Bind {
        name: String,
        ty: Type,
        mutable: bool,
        declaration: bool,
        value: Option<BoundExpr>,
    },

    /// if / else-if chain / else
    If {
        branches: Vec<IfBranch>,
        else_body: Option<Vec<BoundStmt>>,
    },

    /// Bounded counting loop: for var in start..end (by step)
    For {
        var: String,
        start: BoundExpr,
        end: BoundExpr,
        step: Option<BoundExpr>,
        body: Vec<BoundStmt>,
        invariants: Vec<BoundContract>,
    },

    /// While loop with optional declared invariants
    While {
        condition: BoundExpr,
        body: Vec<BoundStmt>,
        invariants: Vec<BoundContract>,
    },

    Return(Option<BoundExpr>),

    /// Expression statement (a call evaluated for its effects)
    Call(BoundExpr),

    /// Nested block
    Block(Vec<BoundStmt>),
}

/// One arm of an if / else-if chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: BoundExpr,
    pub body: Vec<BoundStmt>,
}

/// Precondition, postcondition or loop invariant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundContract {
    pub condition: BoundExpr,
    pub span: Span,
}

impl BoundContract {
    pub fn new(condition: BoundExpr) -> Self {
        let span = condition.span;
        Self { condition, span }
    }
}

impl BoundStmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// `let name = value`
    pub fn let_(name: impl Into<String>, value: BoundExpr, span: Span) -> Self {
        Self::new(
            StmtKind::Bind {
                name: name.into(),
                ty: value.ty.clone(),
                mutable: false,
                declaration: true,
                value: Some(value),
            },
            span,
        )
    }

    /// `var name = value`
    pub fn let_mut(name: impl Into<String>, value: BoundExpr, span: Span) -> Self {
        Self::new(
            StmtKind::Bind {
                name: name.into(),
                ty: value.ty.clone(),
                mutable: true,
                declaration: true,
                value: Some(value),
            },
            span,
        )
    }

    /// `name = value` on an existing mutable variable
    pub fn assign(name: impl Into<String>, value: BoundExpr, span: Span) -> Self {
        Self::new(
            StmtKind::Bind {
                name: name.into(),
                ty: value.ty.clone(),
                mutable: true,
                declaration: false,
                value: Some(value),
            },
            span,
        )
    }

    pub fn if_(condition: BoundExpr, body: Vec<BoundStmt>, else_body: Option<Vec<BoundStmt>>, span: Span) -> Self {
        Self::new(
            StmtKind::If {
                branches: vec![IfBranch { condition, body }],
                else_body,
            },
            span,
        )
    }

    pub fn while_(condition: BoundExpr, body: Vec<BoundStmt>, invariants: Vec<BoundContract>, span: Span) -> Self {
        Self::new(
            StmtKind::While {
                condition,
                body,
                invariants,
            },
            span,
        )
    }

    pub fn ret(value: Option<BoundExpr>, span: Span) -> Self {
        Self::new(StmtKind::Return(value), span)
    }

    pub fn call(expr: BoundExpr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Call(expr), span)
    }

    /// Expressions evaluated directly by this statement (not by nested
    /// statements).
    pub fn exprs(&self) -> Vec<&BoundExpr> {
        match &self.kind {
            StmtKind::Bind { value, .. } => value.iter().collect(),
            StmtKind::If { branches, .. } => branches.iter().map(|b| &b.condition).collect(),
            StmtKind::For { start, end, step, .. } => {
                let mut out = vec![start, end];
                out.extend(step.iter());
                out
            }
            StmtKind::While { condition, .. } => vec![condition],
            StmtKind::Return(value) => value.iter().collect(),
            StmtKind::Call(expr) => vec![expr],
            StmtKind::Block(_) => Vec::new(),
        }
    }

    /// Directly nested statement lists
    pub fn nested(&self) -> Vec<&[BoundStmt]> {
        match &self.kind {
            StmtKind::If { branches, else_body } => {
                let mut out: Vec<&[BoundStmt]> = branches.iter().map(|b| b.body.as_slice()).collect();
                if let Some(else_body) = else_body {
                    out.push(else_body);
                }
                out
            }
            StmtKind::For { body, .. } | StmtKind::While { body, .. } | StmtKind::Block(body) => vec![body],
            StmtKind::Bind { .. } | StmtKind::Return(_) | StmtKind::Call(_) => Vec::new(),
        }
    }
}
