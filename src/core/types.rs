use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

pub type Row = Vec<Value>;

/// Entity identifier: one value for simple ids, several for composite ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(Vec<Value>);

impl Identifier {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }

    /// An identifier with any NULL component identifies nothing.
    pub fn is_null(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(Value::is_null)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            values => {
                let parts: Vec<String> = values.iter().map(Value::to_literal).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::single(id)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::single(id)
    }
}

impl From<Value> for Identifier {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_nullness() {
        assert!(!Identifier::from(1).is_null());
        assert!(Identifier::new(vec![Value::Integer(1), Value::Null]).is_null());
        assert!(Identifier::new(vec![]).is_null());
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(Identifier::from(7).to_string(), "7");
        let composite = Identifier::new(vec![Value::Integer(1), Value::Text("a".into())]);
        assert_eq!(composite.to_string(), "(1, 'a')");
        assert!(composite.is_composite());
    }
}
