//! Payload classification.
//!
//! Every inbound payload is classified once into a [`Payload`]; the argument
//! binder consumes the classification, never the raw JSON.

use serde_json::{Map, Value};

use crate::ACTION_ID_KEY;

/// Shape of an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON array: positional arguments, in order.
    Positional(Vec<Value>),
    /// JSON object: keyword arguments.
    Named(Map<String, Value>),
    /// Any other JSON value (including `null`): one positional argument.
    Scalar(Value),
    /// No payload at all: zero arguments.
    None,
}

impl Payload {
    pub fn classify(value: Option<Value>) -> Self {
        match value {
            None => Payload::None,
            Some(Value::Array(items)) => Payload::Positional(items),
            Some(Value::Object(map)) => Payload::Named(map),
            Some(other) => Payload::Scalar(other),
        }
    }

    /// Remove the reserved action id from a keyword payload.
    ///
    /// String ids are returned as-is, numeric ids are stringified, anything
    /// else (including `null`) is dropped.
    pub fn take_action_id(&mut self) -> Option<String> {
        let Payload::Named(map) = self else {
            return None;
        };
        match map.remove(ACTION_ID_KEY)? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Positional(_) => "positional",
            Payload::Named(_) => "named",
            Payload::Scalar(_) => "scalar",
            Payload::None => "none",
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::classify(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_shapes() {
        assert_eq!(
            Payload::classify(Some(json!([1, 2]))),
            Payload::Positional(vec![json!(1), json!(2)])
        );
        assert!(matches!(
            Payload::classify(Some(json!({"a": 1}))),
            Payload::Named(_)
        ));
        assert_eq!(
            Payload::classify(Some(json!("hi"))),
            Payload::Scalar(json!("hi"))
        );
        assert_eq!(Payload::classify(Some(Value::Null)), Payload::Scalar(Value::Null));
        assert_eq!(Payload::classify(None), Payload::None);
    }

    #[test]
    fn take_action_id_strips_key() {
        let mut p = Payload::from(json!({"__action_id": "a-7", "x": 1}));
        assert_eq!(p.take_action_id().as_deref(), Some("a-7"));
        match p {
            Payload::Named(map) => {
                assert!(!map.contains_key(ACTION_ID_KEY));
                assert_eq!(map.get("x"), Some(&json!(1)));
            }
            other => panic!("expected Named, got {other:?}"),
        }
    }

    #[test]
    fn take_action_id_numeric_and_missing() {
        let mut p = Payload::from(json!({"__action_id": 12}));
        assert_eq!(p.take_action_id().as_deref(), Some("12"));

        let mut p = Payload::from(json!({"x": 1}));
        assert_eq!(p.take_action_id(), None);

        let mut p = Payload::from(json!([{"__action_id": "nested"}]));
        assert_eq!(p.take_action_id(), None);
    }

    #[test]
    fn null_action_id_is_removed_but_ignored() {
        let mut p = Payload::from(json!({"__action_id": null, "a": 1}));
        assert_eq!(p.take_action_id(), None);
        match p {
            Payload::Named(map) => assert_eq!(map.len(), 1),
            other => panic!("expected Named, got {other:?}"),
        }
    }
}
