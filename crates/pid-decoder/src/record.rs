//! Per-cycle sample record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A decoded or merged measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Not read this cycle
    #[default]
    Unknown,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown)
    }

    /// Known and non-zero (numbers) or non-empty (text)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        n.map_or(Value::Unknown, Value::Number)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// One acquisition cycle's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl SampleRecord {
    /// Record with every key in `keys` set to unknown
    pub fn new<I, S>(timestamp: DateTime<Utc>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamp,
            fields: keys
                .into_iter()
                .map(|k| (k.into(), Value::Unknown))
                .collect(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric value of `name`, `None` when absent or unknown
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    /// Overwrite with decoded pairs
    pub fn merge(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        self.fields.extend(values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_prepopulated_keys_are_unknown() {
        let record = SampleRecord::new(ts(), ["soc", "speed"]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("soc"), Some(&Value::Unknown));
        assert_eq!(record.number("soc"), None);
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_merge_and_truthiness() {
        let mut record = SampleRecord::new(ts(), ["charging"]);
        assert!(!record.get("charging").unwrap().is_truthy());
        record.merge([("charging".to_string(), Value::Number(1.0))]);
        assert!(record.get("charging").unwrap().is_truthy());
        record.set("charging", 0.0);
        assert!(!record.get("charging").unwrap().is_truthy());
        assert!(record.get("charging").unwrap().is_known());
        record.set("source", "/dev/ttyACM0");
        assert_eq!(record.get("source"), Some(&Value::Text("/dev/ttyACM0".into())));
    }

    #[test]
    fn test_serializes_unknown_as_null() {
        let mut record = SampleRecord::new(ts(), ["soc", "speed"]);
        record.set("soc", 55.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["soc"], serde_json::json!(55.5));
        assert!(json["speed"].is_null());
        assert_eq!(json["timestamp"], serde_json::json!("2026-03-01T12:00:00Z"));
    }
}
