pub mod broker_venue;
pub mod listeners;
pub mod market_venue;

pub use broker_venue::{BrokerVenue, BrokerVenueEvent};
pub use listeners::*;
pub use market_venue::{MarketVenue, MarketVenueEvent};
