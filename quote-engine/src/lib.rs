//! Quote subscription multiplexer for one market-data venue session.
//!
//! Routes level-1 and market-depth updates to any number of independent
//! listeners per instrument, without touching the order coordinator's lock.

pub mod engine;

pub use engine::{EngineConfig, QuoteEngine};
