//! Raw adapter output, before normalization.

use rhai::Dynamic;
use serde_json::{Map, Value};

use crate::classify::PatternKind;

/// A JSON object: one raw row.
pub type Record = Map<String, Value>;

/// The shape of a value produced by a script.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape {
    /// Columnar data. Rows are positional against `columns`.
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// A sequence of records.
    Records(Vec<Record>),
    /// One record.
    Single(Record),
    /// Nothing (unit, null or an empty array).
    Empty,
    /// A value that cannot hold rows, with a description of what it was.
    Unsupported(String),
}

impl RawShape {
    /// Detect the shape of a JSON value.
    ///
    /// Objects are read as a split table (`{columns, data}`), then as a
    /// columnar table (every value an array of the same length), then as a
    /// single record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => RawShape::Empty,
            Value::Array(items) if items.is_empty() => RawShape::Empty,
            Value::Object(map) if map.is_empty() => RawShape::Empty,
            Value::Array(items) => {
                if items.iter().all(Value::is_object) {
                    RawShape::Records(
                        items
                            .into_iter()
                            .filter_map(|v| match v {
                                Value::Object(map) => Some(map),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    RawShape::Unsupported("array of non-record values".to_string())
                }
            }
            Value::Object(map) => {
                if let Some(table) = split_table(&map) {
                    return table;
                }
                if let Some(table) = columnar_table(&map) {
                    return table;
                }
                RawShape::Single(map)
            }
            Value::Bool(_) => RawShape::Unsupported("bool".to_string()),
            Value::Number(_) => RawShape::Unsupported("number".to_string()),
            Value::String(_) => RawShape::Unsupported("string".to_string()),
        }
    }

    /// Detect the shape of a script value.
    pub fn from_dynamic(value: &Dynamic) -> Self {
        if value.is_unit() {
            return RawShape::Empty;
        }
        match rhai::serde::from_dynamic::<Value>(value) {
            Ok(json) => Self::from_value(json),
            Err(_) => RawShape::Unsupported(value.type_name().to_string()),
        }
    }

    /// Flatten the shape into records, in order.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            RawShape::Table { columns, rows } => rows
                .into_iter()
                .map(|row| {
                    let mut values = row.into_iter();
                    columns
                        .iter()
                        .map(|c| (c.clone(), values.next().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect(),
            RawShape::Records(records) => records,
            RawShape::Single(record) => vec![record],
            RawShape::Empty | RawShape::Unsupported(_) => Vec::new(),
        }
    }
}

fn split_table(map: &Record) -> Option<RawShape> {
    if map.len() != 2 && !(map.len() == 3 && map.contains_key("index")) {
        return None;
    }
    let columns = map.get("columns")?.as_array()?;
    let data = map.get("data")?.as_array()?;

    let columns: Vec<String> = columns
        .iter()
        .map(|c| c.as_str().map(str::to_string))
        .collect::<Option<_>>()?;
    let rows: Vec<Vec<Value>> = data
        .iter()
        .map(|row| row.as_array().cloned())
        .collect::<Option<_>>()?;

    Some(RawShape::Table { columns, rows })
}

fn columnar_table(map: &Record) -> Option<RawShape> {
    let mut len = None;
    for value in map.values() {
        let column = value.as_array()?;
        if column.iter().any(|v| v.is_object() || v.is_array()) {
            return None;
        }
        match len {
            None => len = Some(column.len()),
            Some(l) if l != column.len() => return None,
            Some(_) => {}
        }
    }
    let len = len?;

    let columns: Vec<String> = map.keys().cloned().collect();
    let rows = (0..len)
        .map(|i| {
            map.values()
                .map(|column| column.get(i).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Some(RawShape::Table { columns, rows })
}

/// A chunk of adapter output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    pub shape: RawShape,
    pub pattern: PatternKind,
    /// Symbol the batch was produced for; used when a row has no ticker.
    pub origin: Option<String>,
}

impl RawBatch {
    pub fn new(shape: RawShape, pattern: PatternKind) -> Self {
        Self {
            shape,
            pattern,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records() {
        let shape = RawShape::from_value(json!([{"ticker": "AAA"}, {"ticker": "BBB"}]));
        assert!(matches!(&shape, RawShape::Records(r) if r.len() == 2));
    }

    #[test]
    fn test_single_record() {
        let shape = RawShape::from_value(json!({"ticker": "AAA", "date": "2024-01-02"}));
        assert!(matches!(shape, RawShape::Single(_)));
    }

    #[test]
    fn test_columnar_table() {
        let shape = RawShape::from_value(json!({
            "ticker": ["AAA", "BBB"],
            "date": ["2024-01-02", "2024-01-03"],
        }));
        let records = shape.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["ticker"], "BBB");
        assert_eq!(records[1]["date"], "2024-01-03");
    }

    #[test]
    fn test_ragged_columns_are_a_single_record() {
        let shape = RawShape::from_value(json!({"a": [1, 2], "b": [1]}));
        assert!(matches!(shape, RawShape::Single(_)));
    }

    #[test]
    fn test_split_table() {
        let shape = RawShape::from_value(json!({
            "columns": ["ticker", "score"],
            "data": [["AAA", 1], ["BBB"]],
        }));
        let records = shape.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["score"], 1);
        assert_eq!(records[1]["score"], Value::Null);
    }

    #[test]
    fn test_empty_and_unsupported() {
        assert_eq!(RawShape::from_value(Value::Null), RawShape::Empty);
        assert_eq!(RawShape::from_value(json!([])), RawShape::Empty);
        assert!(matches!(RawShape::from_value(json!(3)), RawShape::Unsupported(_)));
        assert!(matches!(
            RawShape::from_value(json!([1, 2])),
            RawShape::Unsupported(_)
        ));
    }

    #[test]
    fn test_from_dynamic() {
        let engine = rhai::Engine::new();
        let value: Dynamic = engine.eval(r#"[#{ ticker: "AAA", hit: true }]"#).unwrap();
        let records = RawShape::from_dynamic(&value).into_records();
        assert_eq!(records[0]["hit"], true);

        assert_eq!(RawShape::from_dynamic(&Dynamic::UNIT), RawShape::Empty);
    }
}
