use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime value flowing through the operand stack and local slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Boolean truth value.
    Bool(bool),
    /// Owned text.
    Text(String),
    /// Absence of a value (a body that falls off its end yields this).
    Unit,
    /// Opaque host handle (callables resolved through the host environment).
    Opaque(u64),
}

impl Value {
    /// Attempt to get the value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempt to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Variant name, for diagnostics and type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Text(_) => "Text",
            Value::Unit => "Unit",
            Value::Opaque(_) => "Opaque",
        }
    }

    /// Repr-style rendering: integers and booleans bare, text single-quoted,
    /// unit as `()`, handles as `<opaque:N>`.
    pub fn literal(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => format!("'{s}'"),
            Value::Unit => "()".to_string(),
            Value::Opaque(h) => format!("<opaque:{h}>"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Value::Int(-3).literal(), "-3");
        assert_eq!(Value::Bool(true).literal(), "true");
        assert_eq!(Value::Text("hi".to_string()).literal(), "'hi'");
        assert_eq!(Value::Unit.literal(), "()");
        assert_eq!(Value::Opaque(7).literal(), "<opaque:7>");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Int(0).kind(), "Int");
        assert_eq!(Value::Bool(false).kind(), "Bool");
        assert_eq!(Value::Text(String::new()).kind(), "Text");
        assert_eq!(Value::Unit.kind(), "Unit");
        assert_eq!(Value::Opaque(0).kind(), "Opaque");
    }

    #[test]
    fn test_neutral_default() {
        assert_eq!(Value::default(), Value::Int(0));
    }
}
