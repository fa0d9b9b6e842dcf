//! Contract for the market-data venue connection, independent of the order
//! venue and its lock.

use crate::error::TradingError;
use crate::model::{Instrument, Level1Quote, MarketDepthQuote, QuoteError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::mpsc::Sender;

/// Raw updates pushed by the data venue's feed thread into the engine's
/// ingestion channel.
#[derive(Debug, Clone)]
pub enum MarketVenueEvent {
    Level1(Level1Quote),
    Depth(MarketDepthQuote),
    Error(QuoteError),
    Disconnected,
}

/// One connection to a real-time market-data venue.
pub trait MarketVenue: Send {
    /// Establishes the session with venue-specific parameters. Quote
    /// updates for opened feeds are pushed through `events` from the
    /// venue's feed thread.
    fn connect(
        &mut self,
        events: Sender<MarketVenueEvent>,
        params: &HashMap<String, String>,
    ) -> Result<(), TradingError>;

    /// Tears down the session and every open feed. Must be idempotent.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Opens the top-of-book feed for an instrument. `delayed` requests
    /// delayed rather than real-time data where the venue distinguishes.
    fn open_level1(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError>;

    /// Closes the top-of-book feed; unknown instruments are a no-op.
    fn close_level1(&mut self, instrument: &Instrument);

    /// Opens the market-depth feed for an instrument.
    fn open_depth(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError>;

    /// Closes the market-depth feed; unknown instruments are a no-op.
    fn close_depth(&mut self, instrument: &Instrument);

    /// The venue's own clock.
    fn server_time(&self) -> Result<DateTime<Utc>, TradingError>;
}
