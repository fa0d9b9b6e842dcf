//! Simulated venue connections for demos and integration testing.
//!
//! `SimBrokerVenue` plays the execution venue: it acknowledges, fills,
//! rejects, and cancels orders on its own transport thread. `SimMarketVenue`
//! plays the data venue with a random-walk feed. Neither opens a socket;
//! both honor the same contracts a live gateway would.

pub mod broker_venue;
pub mod market_venue;

pub use broker_venue::{FillBehavior, SimBrokerVenue};
pub use market_venue::SimMarketVenue;
