use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use trading::traits::market_venue::{MarketVenue, MarketVenueEvent};
use trading::{
    ErrorCode, Instrument, Level1Quote, Level1QuoteListener, Level2QuoteListener, ListenerRegistry,
    MarketDepthQuote, QuoteError, QuoteErrorListener, SessionState, TradingError,
};

/// Startup options for the quote engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Request delayed rather than real-time feeds for new subscriptions.
    pub use_delayed_data: bool,
    /// Venue-specific connection parameters, passed through opaquely.
    pub venue_params: HashMap<String, String>,
}

struct EngineInner {
    venue: Mutex<Box<dyn MarketVenue>>,
    state: Mutex<SessionState>,
    level1: ListenerRegistry<Instrument, dyn Level1QuoteListener>,
    depth: ListenerRegistry<Instrument, dyn Level2QuoteListener>,
    errors: ListenerRegistry<(), dyn QuoteErrorListener>,
    // Instruments whose venue feeds this engine currently has open. The
    // start path and the first-subscriber path both go through these, so a
    // feed is opened at most once per instrument.
    level1_feeds: Mutex<HashSet<Instrument>>,
    depth_feeds: Mutex<HashSet<Instrument>>,
    delayed: AtomicBool,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fans market data out to subscribed listeners, independent of the order
/// coordinator. Cheap to clone; clones share one venue session.
///
/// Subscriptions may be registered before the engine starts; starting the
/// engine opens the venue feeds for everything already registered. Stopping
/// the engine releases the venue connection but keeps local registrations,
/// so a restart resubscribes.
#[derive(Clone)]
pub struct QuoteEngine {
    inner: Arc<EngineInner>,
}

impl QuoteEngine {
    pub fn new(venue: Box<dyn MarketVenue>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                venue: Mutex::new(venue),
                state: Mutex::new(SessionState::Stopped),
                level1: ListenerRegistry::new(),
                depth: ListenerRegistry::new(),
                errors: ListenerRegistry::new(),
                level1_feeds: Mutex::new(HashSet::new()),
                depth_feeds: Mutex::new(HashSet::new()),
                delayed: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts the engine with default configuration.
    pub fn start_engine(&self) -> Result<(), TradingError> {
        self.start_engine_with(EngineConfig::default())
    }

    /// Starts the engine: connects the venue, opens feeds for every
    /// already-registered subscription, and begins ingesting updates.
    ///
    /// Starting an engine that is already running fails with
    /// `TradingError::Configuration`.
    pub fn start_engine_with(&self, config: EngineConfig) -> Result<(), TradingError> {
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            match *state {
                SessionState::Stopped => *state = SessionState::Connecting,
                _ => {
                    return Err(TradingError::Configuration(
                        "quote engine is already started".into(),
                    ))
                }
            }
        }
        self.reap_workers();
        self.inner
            .delayed
            .store(config.use_delayed_data, Ordering::SeqCst);

        let (tx, rx) = channel();
        {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            if let Err(e) = venue.connect(tx, &config.venue_params) {
                let mut state = self.inner.state.lock().expect("session state poisoned");
                *state = SessionState::Stopped;
                return Err(e);
            }
        }
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            *state = SessionState::Connected;
        }

        self.open_registered_feeds();
        self.spawn_ingestion(rx)?;
        info!("quote engine started");
        Ok(())
    }

    /// Releases the venue connection and subscriptions. Idempotent.
    pub fn stop_engine(&self) {
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            if !state.is_active() {
                return;
            }
            *state = SessionState::Stopped;
        }
        self.inner.shutdown.store(true, Ordering::SeqCst);
        {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            venue.disconnect();
        }
        // The venue tore its feeds down with the session; a restart opens
        // them afresh from the registries.
        self.inner.level1_feeds.lock().expect("feed set poisoned").clear();
        self.inner.depth_feeds.lock().expect("feed set poisoned").clear();
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.workers.lock().expect("worker list poisoned");
            guard.drain(..).collect()
        };
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
        info!("quote engine stopped");
    }

    /// True once started and not yet stopped, whatever the connection state.
    pub fn started(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("session state poisoned")
            .is_active()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("session state poisoned")
            .is_connected()
    }

    /// The data venue's current clock reading.
    pub fn server_time(&self) -> Result<DateTime<Utc>, TradingError> {
        self.require_connected()?;
        let venue = self.inner.venue.lock().expect("venue poisoned");
        venue.server_time()
    }

    /// Whether future subscriptions request delayed rather than real-time
    /// feeds. Already-open subscriptions are unaffected.
    pub fn use_delayed_data(&self, use_delayed: bool) {
        self.inner.delayed.store(use_delayed, Ordering::SeqCst);
    }

    /// Registers a top-of-book listener for an instrument. The first
    /// listener per instrument opens the venue feed; later listeners share
    /// it. Independent listeners never see each other.
    pub fn subscribe_level1(
        &self,
        instrument: &Instrument,
        listener: Arc<dyn Level1QuoteListener>,
    ) -> Result<(), TradingError> {
        let count = self.inner.level1.add(instrument.clone(), listener.clone());
        if count == 1 && self.is_connected() {
            if let Err(e) = self.open_level1_feed(instrument) {
                self.inner.level1.remove(instrument, &listener);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deregisters a top-of-book listener; closing the venue feed when the
    /// last one goes. Unsubscribing a listener that was never registered is
    /// a no-op.
    pub fn unsubscribe_level1(
        &self,
        instrument: &Instrument,
        listener: &Arc<dyn Level1QuoteListener>,
    ) {
        let remaining = self.inner.level1.remove(instrument, listener);
        if remaining == 0 && self.is_connected() {
            self.close_level1_feed(instrument);
        }
    }

    /// Registers a market-depth listener; same contract as
    /// [`QuoteEngine::subscribe_level1`].
    pub fn subscribe_market_depth(
        &self,
        instrument: &Instrument,
        listener: Arc<dyn Level2QuoteListener>,
    ) -> Result<(), TradingError> {
        let count = self.inner.depth.add(instrument.clone(), listener.clone());
        if count == 1 && self.is_connected() {
            if let Err(e) = self.open_depth_feed(instrument) {
                self.inner.depth.remove(instrument, &listener);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deregisters a market-depth listener; same contract as
    /// [`QuoteEngine::unsubscribe_level1`].
    pub fn unsubscribe_market_depth(
        &self,
        instrument: &Instrument,
        listener: &Arc<dyn Level2QuoteListener>,
    ) {
        let remaining = self.inner.depth.remove(instrument, listener);
        if remaining == 0 && self.is_connected() {
            self.close_depth_feed(instrument);
        }
    }

    pub fn add_error_listener(&self, listener: Arc<dyn QuoteErrorListener>) {
        self.inner.errors.add((), listener);
    }

    pub fn remove_error_listener(&self, listener: &Arc<dyn QuoteErrorListener>) {
        self.inner.errors.remove(&(), listener);
    }

    /// Delivers a level-1 quote to every listener subscribed to its
    /// instrument, in registration order. A failing listener is isolated
    /// and reported on the error channel; delivery continues.
    pub fn fire_level1_quote(&self, quote: &Level1Quote) {
        let outcome = self
            .inner
            .level1
            .dispatch(quote.instrument(), "level1", |l| l.quote_received(quote));
        if outcome.failed > 0 {
            self.fire_error_event(
                &QuoteError::new(
                    ErrorCode::ListenerFailure,
                    format!("{} level-1 listener(s) failed", outcome.failed),
                )
                .for_instrument(quote.instrument().clone()),
            );
        }
    }

    /// Delivers a market-depth entry; same contract as
    /// [`QuoteEngine::fire_level1_quote`].
    pub fn fire_market_depth_quote(&self, quote: &MarketDepthQuote) {
        let outcome = self
            .inner
            .depth
            .dispatch(quote.instrument(), "depth", |l| l.depth_received(quote));
        if outcome.failed > 0 {
            self.fire_error_event(
                &QuoteError::new(
                    ErrorCode::ListenerFailure,
                    format!("{} depth listener(s) failed", outcome.failed),
                )
                .for_instrument(quote.instrument().clone()),
            );
        }
    }

    /// Delivers a market-data error to every error listener.
    pub fn fire_error_event(&self, error: &QuoteError) {
        self.inner
            .errors
            .dispatch(&(), "quote-error", |l| l.quote_error(error));
    }

    fn require_connected(&self) -> Result<(), TradingError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TradingError::not_connected("quote engine"))
        }
    }

    /// Opens the venue's level-1 feed unless this engine already has it
    /// open. The feed set stays locked across the venue call, so two
    /// racing openers resolve to exactly one venue open.
    fn open_level1_feed(&self, instrument: &Instrument) -> Result<(), TradingError> {
        let mut feeds = self.inner.level1_feeds.lock().expect("feed set poisoned");
        if !feeds.insert(instrument.clone()) {
            return Ok(());
        }
        let delayed = self.inner.delayed.load(Ordering::SeqCst);
        let mut venue = self.inner.venue.lock().expect("venue poisoned");
        if let Err(e) = venue.open_level1(instrument, delayed) {
            feeds.remove(instrument);
            return Err(e);
        }
        Ok(())
    }

    fn close_level1_feed(&self, instrument: &Instrument) {
        let mut feeds = self.inner.level1_feeds.lock().expect("feed set poisoned");
        if feeds.remove(instrument) {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            venue.close_level1(instrument);
        }
    }

    /// Same contract as [`QuoteEngine::open_level1_feed`], for the book.
    fn open_depth_feed(&self, instrument: &Instrument) -> Result<(), TradingError> {
        let mut feeds = self.inner.depth_feeds.lock().expect("feed set poisoned");
        if !feeds.insert(instrument.clone()) {
            return Ok(());
        }
        let delayed = self.inner.delayed.load(Ordering::SeqCst);
        let mut venue = self.inner.venue.lock().expect("venue poisoned");
        if let Err(e) = venue.open_depth(instrument, delayed) {
            feeds.remove(instrument);
            return Err(e);
        }
        Ok(())
    }

    fn close_depth_feed(&self, instrument: &Instrument) {
        let mut feeds = self.inner.depth_feeds.lock().expect("feed set poisoned");
        if feeds.remove(instrument) {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            venue.close_depth(instrument);
        }
    }

    /// Opens venue feeds for subscriptions registered before start. A feed
    /// a racing subscriber opened first is skipped, not reopened.
    fn open_registered_feeds(&self) {
        for instrument in self.inner.level1.keys() {
            if let Err(e) = self.open_level1_feed(&instrument) {
                warn!("could not open level-1 feed for {}: {}", instrument, e);
            }
        }
        for instrument in self.inner.depth.keys() {
            if let Err(e) = self.open_depth_feed(&instrument) {
                warn!("could not open depth feed for {}: {}", instrument, e);
            }
        }
    }

    fn spawn_ingestion(&self, rx: Receiver<MarketVenueEvent>) -> Result<(), TradingError> {
        let engine = self.clone();
        let handle = thread::Builder::new()
            .name("quote-ingest".into())
            .spawn(move || ingestion_loop(&engine, rx))
            .map_err(|e| TradingError::Connectivity(format!("failed to spawn ingestion: {}", e)))?;
        self.inner
            .workers
            .lock()
            .expect("worker list poisoned")
            .push(handle);
        Ok(())
    }

    fn reap_workers(&self) {
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.workers.lock().expect("worker list poisoned");
            guard.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.join();
        }
        self.inner.shutdown.store(false, Ordering::SeqCst);
    }

    fn mark_disconnected(&self, reason: &str) {
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            if !state.is_active() {
                return;
            }
            *state = SessionState::Disconnected;
        }
        self.inner.level1_feeds.lock().expect("feed set poisoned").clear();
        self.inner.depth_feeds.lock().expect("feed set poisoned").clear();
        warn!("market-data connection lost: {}", reason);
        self.fire_error_event(&QuoteError::new(ErrorCode::ConnectionLost, reason));
    }
}

/// Drains the venue's event channel on a dedicated thread, routing each
/// update to its instrument's listeners. One event is fully dispatched
/// before the next is taken, which gives per-channel ordering.
fn ingestion_loop(engine: &QuoteEngine, rx: Receiver<MarketVenueEvent>) {
    for event in rx {
        if engine.inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match event {
            MarketVenueEvent::Level1(quote) => engine.fire_level1_quote(&quote),
            MarketVenueEvent::Depth(quote) => engine.fire_market_depth_quote(&quote),
            MarketVenueEvent::Error(error) => {
                warn!("market-data venue error: {}", error.message());
                engine.fire_error_event(&error);
            }
            MarketVenueEvent::Disconnected => {
                engine.mark_disconnected("venue dropped the session");
                break;
            }
        }
    }
    debug!("quote ingestion loop ended");
}

#[cfg(test)]
mod tests;
