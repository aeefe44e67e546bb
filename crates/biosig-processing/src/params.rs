//! Keyword-style arguments passed to processing and feature functions

use biosig_core::{BiosigError, BiosigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Parameter value types for flexible configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    IntegerArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl ParameterValue {
    /// Convert to f64 if possible
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Convert to i64 if possible
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            ParameterValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Integer(value.into())
    }
}

impl From<usize> for ParameterValue {
    fn from(value: usize) -> Self {
        ParameterValue::Integer(value as i64)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Boolean(value)
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::String(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_string())
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(value: Vec<f64>) -> Self {
        ParameterValue::FloatArray(value)
    }
}

impl From<Vec<i64>> for ParameterValue {
    fn from(value: Vec<i64>) -> Self {
        ParameterValue::IntegerArray(value)
    }
}

/// Named arguments for one function call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments {
    values: BTreeMap<String, ParameterValue>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value
    pub fn set(&mut self, key: &str, value: impl Into<ParameterValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Builder form of [`Arguments::set`]
    pub fn with(mut self, key: &str, value: impl Into<ParameterValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get float parameter with default
    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(ParameterValue::as_float).unwrap_or(default)
    }

    /// Get integer parameter with default
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(ParameterValue::as_int).unwrap_or(default)
    }

    /// Get boolean parameter with default
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(ParameterValue::as_bool).unwrap_or(default)
    }

    /// Float parameter that must be present
    pub fn require_float(&self, key: &str) -> BiosigResult<f64> {
        self.get(key)
            .and_then(ParameterValue::as_float)
            .ok_or_else(|| missing(key, "number"))
    }

    /// Non-negative integer parameter that must be present
    pub fn require_usize(&self, key: &str) -> BiosigResult<usize> {
        self.get(key)
            .and_then(ParameterValue::as_int)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| missing(key, "non-negative integer"))
    }

    /// Overlay `other` on top of these arguments
    pub fn merge(&mut self, other: &Arguments) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Keep only keys in `allowed`; returns the names that were dropped
    pub fn retain_declared(&mut self, allowed: &BTreeSet<String>) -> Vec<String> {
        let dropped: Vec<String> = self
            .values
            .keys()
            .filter(|key| !allowed.contains(*key))
            .cloned()
            .collect();
        self.values.retain(|key, _| allowed.contains(key));
        dropped
    }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Arguments {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn missing(key: &str, expected: &str) -> BiosigError {
    BiosigError::InvalidConfig {
        reason: format!("argument '{}' must be a {}", key, expected),
    }
}

/// Macro for easy argument construction
#[macro_export]
macro_rules! args {
    () => { $crate::params::Arguments::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut arguments = $crate::params::Arguments::new();
        $(
            arguments.set($key, $value);
        )+
        arguments
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let arguments = args! {
            "cutoff" => 40.0,
            "order" => 4,
            "zero_phase" => true,
            "method" => "butterworth",
        };

        assert_eq!(arguments.get_float("cutoff", 0.0), 40.0);
        assert_eq!(arguments.get_int("order", 0), 4);
        assert!(arguments.get_bool("zero_phase", false));
        assert_eq!(arguments.get("method").and_then(ParameterValue::as_str), Some("butterworth"));
        assert_eq!(arguments.get_float("missing", 1.5), 1.5);
    }

    #[test]
    fn test_parameter_value_conversions() {
        assert_eq!(ParameterValue::Integer(42).as_float(), Some(42.0));
        assert_eq!(ParameterValue::Float(3.0).as_int(), Some(3));
        assert_eq!(ParameterValue::Float(3.5).as_int(), None);
        assert_eq!(ParameterValue::Boolean(true).as_float(), None);
    }

    #[test]
    fn test_required_arguments() {
        let arguments = args! { "window" => 5, "negative" => -1 };
        assert_eq!(arguments.require_usize("window").unwrap(), 5);
        assert!(arguments.require_usize("negative").is_err());
        assert!(arguments.require_float("absent").is_err());
    }

    #[test]
    fn test_merge_and_retain() {
        let mut base = args! { "a" => 1, "b" => 2 };
        base.merge(&args! { "b" => 3, "c" => 4 });
        assert_eq!(base.get_int("b", 0), 3);
        assert_eq!(base.len(), 3);

        let allowed: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let dropped = base.retain_declared(&allowed);
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_json_round_trip_shape() {
        let arguments: Arguments = serde_json::from_str(r#"{"cutoff": 0.5, "order": 2, "bands": [1.0, 2.0]}"#).unwrap();
        assert_eq!(arguments.get("order"), Some(&ParameterValue::Integer(2)));
        assert_eq!(arguments.get("cutoff"), Some(&ParameterValue::Float(0.5)));
        assert_eq!(
            arguments.get("bands"),
            Some(&ParameterValue::FloatArray(vec![1.0, 2.0]))
        );
    }
}
