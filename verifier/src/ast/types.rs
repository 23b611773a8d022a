//! Resolved types attached by the binder

use serde::{Deserialize, Serialize};

/// Type of a bound expression or symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point
    Float,
    /// Boolean
    Bool,
    /// UTF-8 string
    Str,
    /// Unit type ()
    Unit,
    /// Array of elements
    Array(Box<Type>),
    /// User-defined type, resolved by name
    Named(String),
    /// The binder could not resolve a type (error recovery)
    Unknown,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "i64"),
            Type::Float => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::Unit => write!(f, "()"),
            Type::Array(elem) => write!(f, "[{elem}]"),
            Type::Named(name) => write!(f, "{name}"),
            Type::Unknown => write!(f, "?"),
        }
    }
}
