use super::ids::OrderId;
use super::instrument::Instrument;
use super::order::TradeOrder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category attached to asynchronous error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ConnectionLost,
    VenueRejection,
    SubscriptionFailed,
    ListenerFailure,
    DataUnavailable,
}

/// What a venue-driven order update means for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    Acknowledged,
    PartialFill,
    Fill,
    Cancelled,
    Rejected,
    StatusUpdate,
}

/// Delivered to order-event listeners: an immutable snapshot of the order
/// taken after the update was applied, plus what changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    order: TradeOrder,
    kind: OrderEventKind,
    timestamp: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(order: TradeOrder, kind: OrderEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            order,
            kind,
            timestamp,
        }
    }

    pub fn order(&self) -> &TradeOrder {
        &self.order
    }

    pub fn kind(&self) -> OrderEventKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Asynchronous broker-side failure, delivered via the error channel rather
/// than by failing an unrelated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerError {
    code: ErrorCode,
    message: String,
    order_id: Option<OrderId>,
    instrument: Option<Instrument>,
}

impl BrokerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            order_id: None,
            instrument: None,
        }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn for_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }
}

/// Asynchronous market-data failure, delivered via the quote-error channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteError {
    code: ErrorCode,
    message: String,
    instrument: Option<Instrument>,
}

impl QuoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            instrument: None,
        }
    }

    pub fn for_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }
}
