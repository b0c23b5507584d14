//! Price document model
//!
//! The fetched document is a flat JSON object whose values may be scalars,
//! lists or nested objects. Each value is decoded once into [`PriceValue`]
//! and rendered for display through [`PriceValue::display`].

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Longest state a display entity may carry
pub const MAX_STATE_LEN: usize = 255;

/// Most recently fetched price document
pub type PriceSnapshot = Map<String, Value>;

/// Scalar leaf of a price document
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Bool(bool),
    Null,
}

/// Tagged view over one top-level value of the price document
#[derive(Debug, Clone, PartialEq)]
pub enum PriceValue {
    Scalar(Scalar),
    Sequence(Vec<Value>),
    Mapping(Map<String, Value>),
}

/// Value shown as an entity state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayValue {
    Number(Number),
    Bool(bool),
    Text(String),
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One derived entity per snapshot key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEntity {
    pub key: String,
    pub display_value: DisplayValue,
    /// Complete value for lists and objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_value: Option<Value>,
}

impl From<&Value> for PriceValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Scalar(Scalar::Text(s.clone())),
            Value::Number(n) => Self::Scalar(Scalar::Number(n.clone())),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(*b)),
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Array(items) => Self::Sequence(items.clone()),
            Value::Object(map) => Self::Mapping(map.clone()),
        }
    }
}

impl PriceValue {
    /// Display value and, for containers, the full value kept as an attribute
    pub fn display(&self) -> (DisplayValue, Option<Value>) {
        match self {
            Self::Scalar(Scalar::Text(s)) if s.chars().count() <= MAX_STATE_LEN => {
                (DisplayValue::Text(s.clone()), None)
            }
            Self::Scalar(Scalar::Number(n)) if n.to_string().len() <= MAX_STATE_LEN => {
                (DisplayValue::Number(n.clone()), None)
            }
            Self::Scalar(Scalar::Bool(b)) => (DisplayValue::Bool(*b), None),
            Self::Sequence(items) => (
                DisplayValue::Text(format!("list ({})", items.len())),
                Some(Value::Array(items.clone())),
            ),
            Self::Mapping(map) => (
                DisplayValue::Text(format!("dict ({})", map.len())),
                Some(Value::Object(map.clone())),
            ),
            Self::Scalar(other) => (DisplayValue::Text(truncate(&other.to_string())), None),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => f.write_str("null"),
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_STATE_LEN).collect()
}

/// Derive the display entity for one key
pub fn project_value(key: &str, value: &Value) -> DisplayEntity {
    let (display_value, full_value) = PriceValue::from(value).display();
    DisplayEntity {
        key: key.to_string(),
        display_value,
        full_value,
    }
}

/// Derive one display entity per top-level key, in key order
pub fn project(snapshot: &PriceSnapshot) -> Vec<DisplayEntity> {
    snapshot
        .iter()
        .map(|(key, value)| project_value(key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> PriceSnapshot {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn short_scalars_pass_through() {
        let entities = project(&snapshot(json!({
            "current_period_all_in_price": 0.25,
            "country": "NL",
            "hours": 24
        })));

        assert_eq!(entities.len(), 3);
        let by_key = |k: &str| entities.iter().find(|e| e.key == k).unwrap().clone();
        assert_eq!(
            by_key("current_period_all_in_price").display_value,
            DisplayValue::Number(Number::from_f64(0.25).unwrap())
        );
        assert_eq!(by_key("country").display_value, DisplayValue::Text("NL".into()));
        assert_eq!(by_key("hours").display_value.to_string(), "24");
        assert!(entities.iter().all(|e| e.full_value.is_none()));
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(300);
        let entity = project_value("a", &json!(long));
        assert_eq!(entity.display_value, DisplayValue::Text("x".repeat(255)));
        assert!(entity.full_value.is_none());
    }

    #[test]
    fn text_at_limit_is_kept() {
        let exact = "y".repeat(255);
        let entity = project_value("a", &json!(exact.clone()));
        assert_eq!(entity.display_value, DisplayValue::Text(exact));
    }

    #[test]
    fn truncation_counts_characters() {
        let long = "€".repeat(256);
        let entity = project_value("a", &json!(long));
        assert_eq!(entity.display_value.to_string().chars().count(), 255);
    }

    #[test]
    fn containers_are_summarised() {
        let list = project_value("b", &json!([1, 2, 3]));
        assert_eq!(list.display_value, DisplayValue::Text("list (3)".into()));
        assert_eq!(list.full_value, Some(json!([1, 2, 3])));

        let dict = project_value("c", &json!({"x": 1, "y": 2}));
        assert_eq!(dict.display_value, DisplayValue::Text("dict (2)".into()));
        assert_eq!(dict.full_value, Some(json!({"x": 1, "y": 2})));

        let empty = project_value("d", &json!([]));
        assert_eq!(empty.display_value, DisplayValue::Text("list (0)".into()));
    }

    #[test]
    fn null_renders_as_text() {
        let entity = project_value("n", &Value::Null);
        assert_eq!(entity.display_value, DisplayValue::Text("null".into()));
        assert!(entity.full_value.is_none());
    }
}
