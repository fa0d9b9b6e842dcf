use super::instrument::Instrument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteSide {
    Bid,
    Ask,
}

/// An immutable market-depth (level-2) entry: one price level on one side
/// of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepthQuote {
    instrument: Instrument,
    side: QuoteSide,
    level: u32,
    price: f64,
    size: f64,
    timestamp: DateTime<Utc>,
}

impl MarketDepthQuote {
    pub fn new(
        instrument: Instrument,
        side: QuoteSide,
        level: u32,
        price: f64,
        size: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            side,
            level,
            price,
            size,
            timestamp,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn side(&self) -> QuoteSide {
        self.side
    }

    /// Zero-based price level, best first.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
