//! In-memory data source.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use super::{Bar, DataSource};
use crate::error::{DataError, Error, Result};

/// A [`DataSource`] backed by bars held in memory.
///
/// Symbols are stored upper-cased; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource {
    bars: FxHashMap<String, Vec<Bar>>,
    /// Insertion order, so `universe()` is stable.
    order: Vec<String>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the bars for a symbol.
    pub fn with_symbol(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    /// Add (or replace) the bars for a symbol.
    pub fn insert(&mut self, symbol: impl Into<String>, mut bars: Vec<Bar>) {
        let symbol = symbol.into().to_uppercase();
        bars.sort_by_key(|bar| bar.date);
        if !self.bars.contains_key(&symbol) {
            self.order.push(symbol.clone());
        }
        self.bars.insert(symbol, bars);
    }

    /// Parse a JSON document of the form `{ "SYM": [bar, ...], ... }`.
    pub fn from_json(text: &str) -> Result<Self> {
        let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut source = Self::new();
        for (symbol, value) in parsed {
            let bars: Vec<Bar> = serde_json::from_value(value)?;
            source.insert(symbol, bars);
        }
        Ok(source)
    }

    /// Read a JSON bar file (see [`from_json`](Self::from_json)).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Data(DataError::Unavailable(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        })?;
        Self::from_json(&text)
    }

    /// Number of symbols held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<Bar>, DataError> {
        let bars = self
            .bars
            .get(&symbol.to_uppercase())
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))?;

        Ok(bars
            .iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .cloned()
            .collect())
    }

    async fn universe(&self) -> std::result::Result<Vec<String>, DataError> {
        Ok(self.order.clone())
    }
}
