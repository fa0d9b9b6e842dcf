use anyhow::Result;
use broker_gateway::Broker;
use clap::Parser;
use gateway_sim::{FillBehavior, SimBrokerVenue, SimMarketVenue};
use log::{info, warn};
use quote_engine::{EngineConfig, QuoteEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use trading::{
    BrokerError, BrokerErrorListener, Instrument, Level1Quote, Level1QuoteListener,
    Level2QuoteListener, MarketDepthQuote, OrderEvent, OrderEventListener, OrderTicket, OrderType,
    QuoteError, QuoteErrorListener, QuoteType, Side, SymbolId, TimeUpdateListener,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Symbols to trade and subscribe to
    #[arg(long, default_values_t = vec!["AAPL".to_string(), "MSFT".to_string()])]
    symbols: Vec<String>,

    /// Limit orders to submit per symbol
    #[arg(long, default_value_t = 2)]
    orders: u32,

    /// How long to let the session run before shutting down
    #[arg(long, default_value_t = 5)]
    duration_secs: u64,

    /// Market-data tick interval, in milliseconds
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

/// Logs every channel it is registered on. One instance serves as the
/// order, error, time, and quote listener for the whole demo.
struct ConsoleListener;

impl OrderEventListener for ConsoleListener {
    fn order_event(&self, event: &OrderEvent) {
        let order = event.order();
        info!(
            "[order] {} {:?}: filled {}/{} @ {:.2}",
            order.id(),
            event.kind(),
            order.filled_quantity(),
            order.quantity(),
            order.average_fill_price()
        );
    }
}

impl BrokerErrorListener for ConsoleListener {
    fn broker_error(&self, error: &BrokerError) {
        warn!("[broker-error] {:?}: {}", error.code(), error.message());
    }
}

impl TimeUpdateListener for ConsoleListener {
    fn time_updated(&self, time: chrono::DateTime<chrono::Utc>) {
        info!("[venue-time] {}", time.format("%H:%M:%S"));
    }
}

impl Level1QuoteListener for ConsoleListener {
    fn quote_received(&self, quote: &Level1Quote) {
        let bid = quote.value(QuoteType::Bid).unwrap_or(f64::NAN);
        let ask = quote.value(QuoteType::Ask).unwrap_or(f64::NAN);
        info!("[level1] {} {:.2} x {:.2}", quote.instrument(), bid, ask);
    }
}

impl Level2QuoteListener for ConsoleListener {
    fn depth_received(&self, quote: &MarketDepthQuote) {
        info!(
            "[depth] {} {:?} L{} {:.2} x {}",
            quote.instrument(),
            quote.side(),
            quote.level(),
            quote.price(),
            quote.size()
        );
    }
}

impl QuoteErrorListener for ConsoleListener {
    fn quote_error(&self, error: &QuoteError) {
        warn!("[quote-error] {:?}: {}", error.code(), error.message());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let listener = Arc::new(ConsoleListener);

    // 1. Order side: a simulated execution venue behind the coordinator.
    let broker = Broker::new(Box::new(SimBrokerVenue::with_behavior(
        1000,
        FillBehavior::FillInTwo,
    )));
    broker.add_order_event_listener(listener.clone());
    broker.add_broker_error_listener(listener.clone());
    broker.add_time_update_listener(listener.clone());
    broker.connect()?;

    // 2. Data side: random-walk feeds for every requested symbol.
    let engine = QuoteEngine::new(Box::new(SimMarketVenue::new()));
    engine.add_error_listener(listener.clone());
    let mut venue_params = HashMap::new();
    venue_params.insert("tick_ms".to_string(), args.tick_ms.to_string());
    engine.start_engine_with(EngineConfig {
        use_delayed_data: false,
        venue_params,
    })?;

    let instruments: Vec<Instrument> = args
        .symbols
        .iter()
        .map(|s| Instrument::Stock(SymbolId::new(s.as_str(), "SIM")))
        .collect();

    for instrument in &instruments {
        engine.subscribe_level1(instrument, listener.clone())?;
    }
    // Depth only for the first symbol, to keep the log readable.
    if let Some(first) = instruments.first() {
        engine.subscribe_market_depth(first, listener.clone())?;
    }

    // 3. Submit a batch of limit orders through the one-shot path.
    let mut submitted = Vec::new();
    for instrument in &instruments {
        for n in 0..args.orders {
            let ticket = OrderTicket::new(
                instrument.clone(),
                Side::Buy,
                10.0,
                OrderType::Limit(100.0 + n as f64),
            );
            let id = broker.submit(ticket)?;
            submitted.push(id);
        }
    }

    // 4. Replace the last order under one lock scope. The sim venue may
    // have filled it already, in which case the replace reports not-found.
    if let (Some(&last), Some(instrument)) = (submitted.last(), instruments.last()) {
        let replacement =
            OrderTicket::new(instrument.clone(), Side::Buy, 10.0, OrderType::Limit(99.5));
        match broker.cancel_and_replace_order(last, replacement) {
            Ok(id) => info!("order {} replaced by {}", last, id),
            Err(e) => warn!("replace of order {} skipped: {}", last, e),
        }
    }

    tokio::time::sleep(Duration::from_secs(args.duration_secs)).await;

    // 5. Final snapshot, then clean shutdown.
    for order in broker.open_orders() {
        info!("still open: {} ({:?})", order.id(), order.status());
    }
    for position in broker.all_positions()? {
        info!(
            "position: {} {} @ {:.2}",
            position.instrument(),
            position.quantity(),
            position.average_cost()
        );
    }

    engine.stop_engine();
    broker.disconnect();
    Ok(())
}
