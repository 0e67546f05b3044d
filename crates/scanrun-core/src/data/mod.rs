//! Market data available to scanning scripts.
//!
//! Scripts never reach the network or the filesystem themselves; every bar and
//! universe they see comes through a [`DataSource`] owned by the host.

mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

pub use memory::MemoryDataSource;

/// A single daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: i64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Provider of bars and symbol universes.
///
/// Implementations must be cheap to share: the engine hands the same source to
/// every job through an `Arc`.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Bars for `symbol` with `start <= date <= end`, oldest first.
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;

    /// Every symbol this source can serve.
    async fn universe(&self) -> Result<Vec<String>, DataError>;
}
