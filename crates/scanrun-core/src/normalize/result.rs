//! The canonical result row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::raw::Record;
use crate::classify::PatternKind;

/// Attribute key carrying a frame row's signal column.
pub const CATEGORY_KEY: &str = "category";

/// A flat attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Strings, and nested values as their JSON text.
    Text(String),
}

impl Scalar {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => match n.as_f64() {
                    Some(f) if f.is_finite() => Scalar::Float(f),
                    _ => Scalar::Null,
                },
            },
            Value::String(s) => Scalar::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Scalar::Text(value.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(*f),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str("-"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// One hit, in the shape every caller sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub ticker: String,
    pub date: NaiveDate,
    pub attributes: BTreeMap<String, Scalar>,
    pub source_pattern: PatternKind,
}

impl NormalizedResult {
    /// The signal column a frame row was reported under.
    pub fn category(&self) -> Option<&str> {
        self.attributes.get(CATEGORY_KEY).and_then(Scalar::as_str)
    }

    /// Render the result as a raw record that normalizes back to itself.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("ticker".to_string(), Value::String(self.ticker.clone()));
        record.insert(
            "date".to_string(),
            Value::String(self.date.format("%Y-%m-%d").to_string()),
        );
        for (key, value) in &self.attributes {
            record.insert(key.clone(), value.to_json());
        }
        record
    }
}
