//! Typed attribute values

use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// One of a fixed set of device tokens, e.g. `hdmi1`
    Enum(String),
    Integer(i64),
    Bool(bool),
    /// Free text such as a model name
    Text(String),
    /// JSON array answers, e.g. warnings or select options
    List(Vec<String>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Enum(s) | AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Enum(s) | AttributeValue::Text(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            AttributeValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

/// Coarse power classification of the `power_status` answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// `on` and `startup` count as on; `standby`, `cooling1` and `cooling2` as off
    pub fn classify(status: &str) -> Option<Self> {
        match status {
            "on" | "startup" => Some(PowerState::On),
            "standby" | "cooling1" | "cooling2" => Some(PowerState::Off),
            _ => None,
        }
    }

    pub fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_str().and_then(Self::classify)
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_classification() {
        assert_eq!(PowerState::classify("on"), Some(PowerState::On));
        assert_eq!(PowerState::classify("startup"), Some(PowerState::On));
        assert_eq!(PowerState::classify("standby"), Some(PowerState::Off));
        assert_eq!(PowerState::classify("cooling1"), Some(PowerState::Off));
        assert_eq!(PowerState::classify("cooling2"), Some(PowerState::Off));
        assert_eq!(PowerState::classify("bogus"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::Bool(true).to_string(), "on");
        assert_eq!(AttributeValue::Integer(1234).to_string(), "1234");
        assert_eq!(
            AttributeValue::List(vec!["a".into(), "b".into()]).to_string(),
            "a, b"
        );
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_string(&AttributeValue::Enum("hdmi1".into())).unwrap();
        assert_eq!(json, r#"{"type":"enum","value":"hdmi1"}"#);
    }
}
