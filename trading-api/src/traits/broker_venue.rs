//! Contract for the order-execution venue connection.
//!
//! The transport behind it (socket, REST, FIX) is out of scope; the broker
//! consumes this as an opaque dependency and a fake venue slots in for
//! tests.

use crate::error::TradingError;
use crate::model::{BrokerError, OrderId, OrderStatus, Position, TradeOrder};
use chrono::{DateTime, Utc};
use std::sync::mpsc::Sender;

/// Raw updates pushed by the venue's transport thread into the broker's
/// ingestion channel.
#[derive(Debug, Clone)]
pub enum BrokerVenueEvent {
    /// Order status transition reported by the venue.
    Status {
        order_id: OrderId,
        status: OrderStatus,
    },
    /// A (possibly partial) execution against a working order.
    Execution {
        order_id: OrderId,
        quantity: f64,
        price: f64,
        timestamp: DateTime<Utc>,
    },
    /// Venue-side failure not tied to a synchronous call.
    Error(BrokerError),
    /// The venue dropped the session.
    Disconnected,
}

/// One connection to an order-execution venue.
pub trait BrokerVenue: Send {
    /// Establishes the session. The venue pushes subsequent updates through
    /// `events` from its own transport thread, and returns the first valid
    /// order ID for this session; all later IDs are issued locally by
    /// incrementing from it.
    fn connect(&mut self, events: Sender<BrokerVenueEvent>) -> Result<OrderId, TradingError>;

    /// Tears down the session. Must be idempotent. The venue stops pushing
    /// events and drops its end of the channel.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Transmits an ID-stamped order. Acknowledgement and fills arrive
    /// asynchronously as events.
    fn submit_order(&mut self, order: &TradeOrder) -> Result<(), TradingError>;

    /// Requests cancellation; the outcome arrives as a status event.
    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), TradingError>;

    /// Asks the venue to re-report the order's status as an event.
    fn request_order_status(&mut self, order_id: OrderId) -> Result<(), TradingError>;

    /// Open positions for this session's account, from venue state.
    fn positions(&self) -> Result<Vec<Position>, TradingError>;

    /// The venue's own clock.
    fn server_time(&self) -> Result<DateTime<Utc>, TradingError>;
}
