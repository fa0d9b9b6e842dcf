use super::ids::OrderId;
use super::instrument::Instrument;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit(f64),
    Stop(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    GoodTillCancelled,
}

/// Lifecycle of a tracked order. `Pending` on submission; every later
/// transition is applied by the order coordinator from venue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal orders are no longer tracked as open.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// An order as drafted by the client, before an ID has been issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    instrument: Instrument,
    side: Side,
    quantity: f64,
    order_type: OrderType,
    time_in_force: TimeInForce,
    reference: Option<String>,
}

impl OrderTicket {
    pub fn new(instrument: Instrument, side: Side, quantity: f64, order_type: OrderType) -> Self {
        Self {
            instrument,
            side,
            quantity,
            order_type,
            time_in_force: TimeInForce::Day,
            reference: None,
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Free-form client tag carried through to order events.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn order_type(&self) -> &OrderType {
        &self.order_type
    }

    /// Stamps an issued ID onto the ticket, producing a submittable order.
    pub fn into_order(self, id: OrderId, timestamp: i64) -> TradeOrder {
        TradeOrder {
            id,
            instrument: self.instrument,
            side: self.side,
            quantity: self.quantity,
            order_type: self.order_type,
            time_in_force: self.time_in_force,
            reference: self.reference,
            status: OrderStatus::Pending,
            filled_quantity: 0.0,
            average_fill_price: 0.0,
            timestamp,
        }
    }
}

/// An instruction to buy or sell an instrument, stamped with a broker-issued
/// ID. Status fields are mutated only by the order coordinator as venue
/// events arrive; clients observe snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOrder {
    id: OrderId,
    instrument: Instrument,
    side: Side,
    quantity: f64,
    order_type: OrderType,
    time_in_force: TimeInForce,
    reference: Option<String>,
    status: OrderStatus,
    filled_quantity: f64,
    average_fill_price: f64,
    timestamp: i64,
}

impl TradeOrder {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn order_type(&self) -> &OrderType {
        &self.order_type
    }

    pub fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn filled_quantity(&self) -> f64 {
        self.filled_quantity
    }

    pub fn average_fill_price(&self) -> f64 {
        self.average_fill_price
    }

    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Applies a venue-reported status transition.
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    /// Applies a venue-reported execution. Returns the status after the
    /// fill: `PartiallyFilled` while quantity remains, `Filled` otherwise.
    pub fn apply_fill(&mut self, quantity: f64, price: f64) -> OrderStatus {
        let filled = self.filled_quantity + quantity;
        if filled > 0.0 {
            self.average_fill_price =
                (self.average_fill_price * self.filled_quantity + price * quantity) / filled;
        }
        self.filled_quantity = filled;
        self.status = if self.remaining_quantity() > 1e-9 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Filled
        };
        self.status
    }
}
