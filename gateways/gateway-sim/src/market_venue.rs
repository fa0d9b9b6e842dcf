use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use trading::traits::market_venue::{MarketVenue, MarketVenueEvent};
use trading::{
    Instrument, Level1Quote, MarketDepthQuote, QuoteSide, QuoteType, TradingError,
};

const DEPTH_LEVELS: u32 = 5;

struct FeedState {
    price: f64,
    delayed: bool,
    level1: bool,
    depth: bool,
}

/// An in-process stand-in for a market-data venue: a random-walk level-1
/// feed plus a synthetic book, ticking on its own feed thread. Delayed
/// feeds tick at half cadence.
pub struct SimMarketVenue {
    tick_interval: Duration,
    running: Arc<AtomicBool>,
    feeds: Arc<Mutex<HashMap<Instrument, FeedState>>>,
    worker: Option<JoinHandle<()>>,
}

impl SimMarketVenue {
    pub fn new() -> Self {
        Self::with_tick_interval(Duration::from_millis(100))
    }

    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            running: Arc::new(AtomicBool::new(false)),
            feeds: Arc::new(Mutex::new(HashMap::new())),
            worker: None,
        }
    }

    fn require_connected(&self) -> Result<(), TradingError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TradingError::not_connected("sim market venue"));
        }
        Ok(())
    }
}

impl Default for SimMarketVenue {
    fn default() -> Self {
        Self::new()
    }
}

/// One random-walk step: +/- 0.5%, floored so prices stay positive.
fn walk(price: f64) -> f64 {
    let mut rng = rand::thread_rng();
    (price * (1.0 + rng.gen_range(-0.005..0.005))).max(0.01)
}

fn level1_quote(instrument: &Instrument, price: f64) -> Level1Quote {
    let mut rng = rand::thread_rng();
    let spread = price * 0.001;
    let mut values = HashMap::new();
    values.insert(QuoteType::Bid, price - spread);
    values.insert(QuoteType::Ask, price + spread);
    values.insert(QuoteType::Last, price);
    values.insert(QuoteType::Midpoint, price);
    values.insert(QuoteType::BidSize, rng.gen_range(1.0_f64..500.0).round());
    values.insert(QuoteType::AskSize, rng.gen_range(1.0_f64..500.0).round());
    Level1Quote::new(instrument.clone(), Utc::now(), values)
}

fn feed_loop(
    tx: Sender<MarketVenueEvent>,
    running: Arc<AtomicBool>,
    feeds: Arc<Mutex<HashMap<Instrument, FeedState>>>,
    tick_interval: Duration,
) {
    let mut rng = rand::thread_rng();
    let mut round: u64 = 0;
    while running.load(Ordering::SeqCst) {
        thread::sleep(tick_interval);
        round += 1;
        let mut updates: Vec<MarketVenueEvent> = Vec::new();
        {
            let mut feeds = feeds.lock().unwrap();
            for (instrument, feed) in feeds.iter_mut() {
                // Delayed subscriptions only tick on even rounds.
                if feed.delayed && round % 2 == 1 {
                    continue;
                }
                feed.price = walk(feed.price);
                if feed.level1 {
                    updates.push(MarketVenueEvent::Level1(level1_quote(
                        instrument, feed.price,
                    )));
                }
                if feed.depth {
                    let step = feed.price * 0.0005;
                    for level in 0..DEPTH_LEVELS {
                        let offset = step * (level + 1) as f64;
                        let now = Utc::now();
                        updates.push(MarketVenueEvent::Depth(MarketDepthQuote::new(
                            instrument.clone(),
                            QuoteSide::Bid,
                            level,
                            feed.price - offset,
                            rng.gen_range(1.0_f64..200.0).round(),
                            now,
                        )));
                        updates.push(MarketVenueEvent::Depth(MarketDepthQuote::new(
                            instrument.clone(),
                            QuoteSide::Ask,
                            level,
                            feed.price + offset,
                            rng.gen_range(1.0_f64..200.0).round(),
                            now,
                        )));
                    }
                }
            }
        }
        for update in updates {
            if tx.send(update).is_err() {
                return; // engine side went away
            }
        }
    }
    debug!("sim feed loop ended");
}

impl MarketVenue for SimMarketVenue {
    fn connect(
        &mut self,
        events: Sender<MarketVenueEvent>,
        params: &HashMap<String, String>,
    ) -> Result<(), TradingError> {
        if let Some(ms) = params.get("tick_ms") {
            let ms: u64 = ms.parse().map_err(|_| {
                TradingError::Configuration(format!("tick_ms must be an integer, got {:?}", ms))
            })?;
            self.tick_interval = Duration::from_millis(ms);
        }
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let feeds = Arc::clone(&self.feeds);
        let tick_interval = self.tick_interval;
        self.worker = Some(
            thread::Builder::new()
                .name("sim-feed".into())
                .spawn(move || feed_loop(events, running, feeds, tick_interval))
                .map_err(|e| {
                    TradingError::Connectivity(format!("failed to spawn sim feed: {}", e))
                })?,
        );
        info!("sim market venue connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.feeds.lock().unwrap().clear();
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn open_level1(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError> {
        self.require_connected()?;
        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds.entry(instrument.clone()).or_insert_with(|| FeedState {
            price: rand::thread_rng().gen_range(20.0..200.0),
            delayed,
            level1: false,
            depth: false,
        });
        feed.level1 = true;
        Ok(())
    }

    fn close_level1(&mut self, instrument: &Instrument) {
        let mut feeds = self.feeds.lock().unwrap();
        if let Some(feed) = feeds.get_mut(instrument) {
            feed.level1 = false;
            if !feed.depth {
                feeds.remove(instrument);
            }
        }
    }

    fn open_depth(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError> {
        self.require_connected()?;
        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds.entry(instrument.clone()).or_insert_with(|| FeedState {
            price: rand::thread_rng().gen_range(20.0..200.0),
            delayed,
            level1: false,
            depth: false,
        });
        feed.depth = true;
        Ok(())
    }

    fn close_depth(&mut self, instrument: &Instrument) {
        let mut feeds = self.feeds.lock().unwrap();
        if let Some(feed) = feeds.get_mut(instrument) {
            feed.depth = false;
            if !feed.level1 {
                feeds.remove(instrument);
            }
        }
    }

    fn server_time(&self) -> Result<DateTime<Utc>, TradingError> {
        if !self.is_connected() {
            return Err(TradingError::not_connected("sim market venue"));
        }
        Ok(Utc::now())
    }
}
