use super::instrument::Instrument;
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of an open position, produced on demand from
/// venue state. Negative quantity means short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    instrument: Instrument,
    quantity: f64,
    average_cost: f64,
}

impl Position {
    pub fn new(instrument: Instrument, quantity: f64, average_cost: f64) -> Self {
        Self {
            instrument,
            quantity,
            average_cost,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn average_cost(&self) -> f64 {
        self.average_cost
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }
}
