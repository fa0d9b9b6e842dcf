pub mod error;
pub mod model;
pub mod registry;
pub mod session;
pub mod time_util;
pub mod traits;

pub use error::TradingError;
pub use model::depth::{MarketDepthQuote, QuoteSide};
pub use model::events::{BrokerError, ErrorCode, OrderEvent, OrderEventKind, QuoteError};
pub use model::ids::{OrderId, SymbolId};
pub use model::instrument::{ComboTicker, Instrument};
pub use model::order::{OrderStatus, OrderTicket, OrderType, Side, TimeInForce, TradeOrder};
pub use model::position::Position;
pub use model::quote::{Level1Quote, QuoteType};
pub use registry::{DispatchOutcome, ListenerRegistry};
pub use session::SessionState;
pub use traits::broker_venue::{BrokerVenue, BrokerVenueEvent};
pub use traits::listeners::{
    BrokerErrorListener, Level1QuoteListener, Level2QuoteListener, OrderEventListener,
    QuoteErrorListener, TimeUpdateListener,
};
pub use traits::market_venue::{MarketVenue, MarketVenueEvent};
