use serde::{
    Deserialize,
    Serialize,
};

use crate::core::hash::HashMap;

pub type Integer = u64;

pub type Dictionary = HashMap<String, Value>;

pub type List = Vec<Value>;

/// A dynamically-typed value carried in WAMP payloads.
///
/// Variant order matters for deserialization: unsigned integers are preferred over signed ones,
/// which are preferred over floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(Integer),
    SignedInteger(i64),
    Float(f64),
    Bool(bool),
    String(String),
    List(List),
    Dictionary(Dictionary),
    Null,
}

impl Value {
    pub fn integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::SignedInteger(value) => Integer::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&List> {
        match self {
            Self::List(value) => Some(value),
            _ => None,
        }
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        match Integer::try_from(value) {
            Ok(value) => Self::Integer(value),
            Err(_) => Self::SignedInteger(value),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod types_test {
    use crate::core::types::{
        Dictionary,
        List,
        Value,
    };

    #[test]
    fn deserializes_numbers_by_preference() {
        assert_matches::assert_matches!(serde_json::from_str::<Value>("5"), Ok(Value::Integer(5)));
        assert_matches::assert_matches!(
            serde_json::from_str::<Value>("-5"),
            Ok(Value::SignedInteger(-5))
        );
        assert_matches::assert_matches!(serde_json::from_str::<Value>("1.5"), Ok(Value::Float(value)) => {
            assert_eq!(value, 1.5);
        });
        assert_matches::assert_matches!(serde_json::from_str::<Value>("null"), Ok(Value::Null));
    }

    #[test]
    fn deserializes_nested_containers() {
        assert_matches::assert_matches!(
            serde_json::from_str::<Value>(r#"{"a":[1,"b",{}]}"#),
            Ok(Value::Dictionary(dictionary)) => {
                assert_eq!(dictionary, Dictionary::from_iter([(
                    "a".to_owned(),
                    Value::List(List::from_iter([
                        Value::Integer(1),
                        Value::String("b".to_owned()),
                        Value::Dictionary(Dictionary::default()),
                    ])),
                )]));
            }
        );
    }

    #[test]
    fn converts_signed_values_to_unsigned_when_possible() {
        assert_eq!(Value::from(3i64), Value::Integer(3));
        assert_eq!(Value::from(-3i64), Value::SignedInteger(-3));
        assert_eq!(Value::SignedInteger(7).integer(), Some(7));
        assert_eq!(Value::SignedInteger(-7).integer(), None);
    }
}
