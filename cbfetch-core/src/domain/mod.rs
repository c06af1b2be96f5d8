//! Domain types: candles, bucket sizes, time ranges, shaped price series.

pub mod candle;
pub mod granularity;
pub mod price;
pub mod range;

pub use candle::Candle;
pub use granularity::{Granularity, UnsupportedGranularity, MAX_CANDLES_PER_REQUEST};
pub use price::{PricePoint, PriceSeries};
pub use range::TimeRange;
