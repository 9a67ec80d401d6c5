//! Dynamically typed property bags attached to notes and parts, and their
//! conversion into plain JSON trees for the request document.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    #[default]
    Invalid,
    Bool(bool),
    Number(f64),
    String(String),
    Object(PropertyObject),
}

impl PropertyValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, PropertyValue::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PropertyObject> {
        match self {
            PropertyValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Invalid => f.write_str("invalid"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Object(o) => write!(f, "{}", o.to_json()),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<PropertyObject> for PropertyValue {
    fn from(value: PropertyObject) -> Self {
        PropertyValue::Object(value)
    }
}

/// Lifts a plain JSON tree back into a property value. Arrays have no
/// property counterpart and are kept as their JSON text.
impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Invalid,
            serde_json::Value::Bool(b) => PropertyValue::Bool(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Number)
                .unwrap_or_else(|| PropertyValue::String(n.to_string())),
            serde_json::Value::String(s) => PropertyValue::String(s),
            serde_json::Value::Array(items) => {
                PropertyValue::String(serde_json::Value::Array(items).to_string())
            }
            serde_json::Value::Object(map) => PropertyValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key, PropertyValue::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Key/value property bag. Keys are unique; iteration is in key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyObject {
    map: BTreeMap<String, PropertyValue>,
}

impl PropertyObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.map.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(convert_property_object(self))
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyObject {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

pub fn convert_property_object(object: &PropertyObject) -> serde_json::Map<String, serde_json::Value> {
    object
        .iter()
        .map(|(key, value)| (key.to_string(), convert_property_value(value)))
        .collect()
}

/// Precedence: invalid, bool, number, string, object. Anything left over
/// (non-finite numbers, which JSON cannot carry) is rendered as a string.
pub fn convert_property_value(value: &PropertyValue) -> serde_json::Value {
    if value.is_invalid() {
        return serde_json::Value::Null;
    }
    if let Some(b) = value.as_bool() {
        return serde_json::Value::Bool(b);
    }
    if let Some(number) = value.as_number().and_then(json_number) {
        return serde_json::Value::Number(number);
    }
    if let Some(s) = value.as_str() {
        return serde_json::Value::String(s.to_string());
    }
    if let Some(object) = value.as_object() {
        return serde_json::Value::Object(convert_property_object(object));
    }
    serde_json::Value::String(value.to_string())
}

/// Whole numbers inside the exactly representable range go out as integers,
/// so `1.0` is written as `1`.
fn json_number(value: f64) -> Option<serde_json::Number> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        Some(serde_json::Number::from(value as i64))
    } else {
        serde_json::Number::from_f64(value)
    }
}

/// Looks up a numeric part property by a key normalized without `_`, ` `
/// and `-`, case-insensitively. Accepts finite numbers or numeric strings,
/// rounded half away from zero. Falls back to `0.0`.
pub fn resolve_numeric_property(object: &PropertyObject, normalized_target_key: &str) -> f64 {
    for (key, value) in object.iter() {
        if key.trim().is_empty() {
            continue;
        }
        if normalize_key(key) != normalized_target_key {
            continue;
        }

        if let Some(n) = value.as_number().filter(|n| n.is_finite()) {
            return n.round();
        }
        if let Some(parsed) = value
            .as_str()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|n| n.is_finite())
        {
            return parsed.round();
        }
    }

    0.0
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
