//! Bound program model
//!
//! The binder (outside this crate) resolves names and attaches types; the
//! analyses only read this representation. Functions are shared through
//! `Rc` so that rewriting passes can keep untouched functions as-is.

mod expr;
mod span;
mod stmt;
mod types;

pub use expr::*;
pub use span::*;
pub use stmt::*;
pub use types::*;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A bound module: the unit handed to the analysis passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundModule {
    pub name: String,
    pub functions: Vec<Rc<BoundFunction>>,
}

impl BoundModule {
    pub fn new(name: impl Into<String>, functions: Vec<BoundFunction>) -> Self {
        Self {
            name: name.into(),
            functions: functions.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Rc<BoundFunction>> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// A bound function with its contracts and declared effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundFunction {
    pub name: String,
    pub params: Vec<BoundParam>,
    pub return_ty: Type,
    pub preconditions: Vec<BoundContract>,
    pub postconditions: Vec<BoundContract>,
    pub body: Vec<BoundStmt>,
    /// Normalized effect strings (`io:database_write` or `db:w`)
    #[serde(default)]
    pub effects: Vec<String>,
    pub span: Span,
}

impl BoundFunction {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_ty: Type::Unit,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            body: Vec::new(),
            effects: Vec::new(),
            span,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: Type, span: Span) -> Self {
        self.params.push(BoundParam {
            name: name.into(),
            ty,
            span,
        });
        self
    }

    pub fn with_return_type(mut self, ty: Type) -> Self {
        self.return_ty = ty;
        self
    }

    pub fn with_precondition(mut self, condition: BoundExpr) -> Self {
        self.preconditions.push(BoundContract::new(condition));
        self
    }

    pub fn with_postcondition(mut self, condition: BoundExpr) -> Self {
        self.postconditions.push(BoundContract::new(condition));
        self
    }

    pub fn with_body(mut self, body: Vec<BoundStmt>) -> Self {
        self.body = body;
        self
    }

    pub fn with_effect(mut self, effect: impl Into<String>) -> Self {
        self.effects.push(effect.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn param(&self, name: &str) -> Option<&BoundParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_json_roundtrip_keeps_sharing_shape() {
        let span = Span::new(0, 10);
        let f = BoundFunction::new("id", span)
            .with_param("x", Type::Int, Span::new(3, 4))
            .with_return_type(Type::Int)
            .with_body(vec![BoundStmt::ret(Some(BoundExpr::var("x", Type::Int, Span::new(8, 9))), span)]);
        let module = BoundModule::new("m", vec![f]);

        let json = serde_json::to_string(&module).unwrap();
        let back: BoundModule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, module);
        assert_eq!(back.function("id").map(|f| f.params.len()), Some(1));
    }

    #[test]
    fn test_effects_default_when_missing() {
        let json = r#"{
            "name": "f",
            "params": [],
            "return_ty": "Unit",
            "preconditions": [],
            "postconditions": [],
            "body": [],
            "span": { "start": 0, "end": 0 }
        }"#;
        let f: BoundFunction = serde_json::from_str(json).unwrap();
        assert!(f.effects.is_empty());
        assert!(f.is_empty());
    }
}
