use super::ids::SymbolId;
use crate::error::TradingError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A two-legged spread instrument composed from two single instruments
/// plus integer leg ratios.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComboTicker {
    first_leg: Box<Instrument>,
    first_ratio: u32,
    second_leg: Box<Instrument>,
    second_ratio: u32,
}

impl ComboTicker {
    /// Builds a combo from two legs with explicit ratios.
    ///
    /// Fails with `TradingError::Configuration` if either ratio is zero or
    /// either leg is itself a combo.
    pub fn new(
        first_leg: Instrument,
        first_ratio: u32,
        second_leg: Instrument,
        second_ratio: u32,
    ) -> Result<Self, TradingError> {
        if first_ratio == 0 || second_ratio == 0 {
            return Err(TradingError::Configuration(format!(
                "combo ratios must be positive, got {}:{}",
                first_ratio, second_ratio
            )));
        }
        if matches!(first_leg, Instrument::Combo(_)) || matches!(second_leg, Instrument::Combo(_)) {
            return Err(TradingError::Configuration(
                "combo legs must be single instruments".into(),
            ));
        }
        Ok(Self {
            first_leg: Box::new(first_leg),
            first_ratio,
            second_leg: Box::new(second_leg),
            second_ratio,
        })
    }

    pub fn first_leg(&self) -> &Instrument {
        &self.first_leg
    }

    pub fn first_ratio(&self) -> u32 {
        self.first_ratio
    }

    pub fn second_leg(&self) -> &Instrument {
        &self.second_leg
    }

    pub fn second_ratio(&self) -> u32 {
        self.second_ratio
    }
}

/// Unified instrument definition.
///
/// Identity is structural; instruments are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Instrument {
    Stock(SymbolId),
    Future(SymbolId),
    Combo(ComboTicker),
}

impl Instrument {
    /// Builds a 1:1 combo instrument from two legs.
    pub fn combo(first_leg: Instrument, second_leg: Instrument) -> Result<Self, TradingError> {
        Self::combo_with_ratios(first_leg, 1, second_leg, 1)
    }

    /// Builds a combo instrument with explicit leg ratios.
    pub fn combo_with_ratios(
        first_leg: Instrument,
        first_ratio: u32,
        second_leg: Instrument,
        second_ratio: u32,
    ) -> Result<Self, TradingError> {
        Ok(Instrument::Combo(ComboTicker::new(
            first_leg,
            first_ratio,
            second_leg,
            second_ratio,
        )?))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Stock(s) => write!(f, "{}", s),
            Instrument::Future(s) => write!(f, "{}", s),
            Instrument::Combo(c) => write!(
                f,
                "{}x{} / {}x{}",
                c.first_ratio, c.first_leg, c.second_ratio, c.second_leg
            ),
        }
    }
}
