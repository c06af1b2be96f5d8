//! PriceSeries: the shaped output handed back to callers.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One shaped price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

/// Ordered (timestamp, price) series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Tabular view: `time` (naive UTC datetime, ms) and `price` columns.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let millis: Vec<i64> = self.points.iter().map(|p| p.timestamp * 1_000).collect();
        DataFrame::new(vec![
            Column::new("time".into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Column::new("price".into(), self.prices()),
        ])
    }

    /// Write as CSV with an RFC 3339 `time` column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["time", "price"])?;
        for p in &self.points {
            let time = DateTime::<Utc>::from_timestamp(p.timestamp, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| p.timestamp.to_string());
            wtr.write_record([time, p.price.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl IntoIterator for PriceSeries {
    type Item = PricePoint;
    type IntoIter = std::vec::IntoIter<PricePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}
