//! Callback contracts for event fan-out.
//!
//! Listeners are registered behind `Arc` and may be invoked from
//! venue-ingestion threads, concurrently with client calls. Events on one
//! channel are delivered one at a time, in the order the venue produced
//! them; no ordering holds across channels.

use crate::model::{BrokerError, Level1Quote, MarketDepthQuote, OrderEvent, QuoteError};
use chrono::{DateTime, Utc};

/// Receives top-of-book quote snapshots for subscribed instruments.
pub trait Level1QuoteListener: Send + Sync {
    fn quote_received(&self, quote: &Level1Quote);
}

/// Receives market-depth entries for subscribed instruments.
pub trait Level2QuoteListener: Send + Sync {
    fn depth_received(&self, quote: &MarketDepthQuote);
}

/// Receives asynchronous market-data failures.
pub trait QuoteErrorListener: Send + Sync {
    fn quote_error(&self, error: &QuoteError);
}

/// Receives order status changes and fills.
pub trait OrderEventListener: Send + Sync {
    fn order_event(&self, event: &OrderEvent);
}

/// Receives asynchronous broker failures (disconnects, venue errors).
pub trait BrokerErrorListener: Send + Sync {
    fn broker_error(&self, error: &BrokerError);
}

/// Receives the venue's clock roughly once per second while connected, so
/// strategies sync off the venue's time rather than the local machine's.
pub trait TimeUpdateListener: Send + Sync {
    fn time_updated(&self, time: DateTime<Utc>);
}
