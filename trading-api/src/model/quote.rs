use super::instrument::Instrument;
use crate::error::TradingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The named fields a level-1 quote snapshot may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteType {
    Bid,
    Ask,
    BidSize,
    AskSize,
    Last,
    LastSize,
    Midpoint,
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// An immutable point-in-time snapshot of level-1 quote fields for one
/// instrument.
///
/// A quote carries only the fields the venue actually sent. Looking up an
/// absent field is an error, never a default: trading logic must not
/// mistake a missing value for zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level1Quote {
    instrument: Instrument,
    timestamp: DateTime<Utc>,
    values: HashMap<QuoteType, f64>,
}

impl Level1Quote {
    pub fn new(
        instrument: Instrument,
        timestamp: DateTime<Utc>,
        values: HashMap<QuoteType, f64>,
    ) -> Self {
        Self {
            instrument,
            timestamp,
            values,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The field types present on this quote, in no particular order.
    pub fn types(&self) -> Vec<QuoteType> {
        self.values.keys().copied().collect()
    }

    pub fn contains_type(&self, quote_type: QuoteType) -> bool {
        self.values.contains_key(&quote_type)
    }

    /// Returns the stored value for `quote_type`, or
    /// `TradingError::NotFound` if the field is absent from this snapshot.
    pub fn value(&self, quote_type: QuoteType) -> Result<f64, TradingError> {
        self.values.get(&quote_type).copied().ok_or_else(|| {
            TradingError::NotFound(format!(
                "quote for {} has no {:?} field",
                self.instrument, quote_type
            ))
        })
    }
}
