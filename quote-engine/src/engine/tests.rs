use super::*;
use chrono::Utc;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trading::{QuoteSide, QuoteType, SymbolId};

#[derive(Clone, Default)]
struct VenueProbe {
    level1_opens: Arc<Mutex<Vec<(Instrument, bool)>>>,
    level1_closes: Arc<Mutex<Vec<Instrument>>>,
    depth_opens: Arc<Mutex<Vec<(Instrument, bool)>>>,
    depth_closes: Arc<Mutex<Vec<Instrument>>>,
    events: Arc<Mutex<Option<Sender<MarketVenueEvent>>>>,
}

impl VenueProbe {
    fn send(&self, event: MarketVenueEvent) {
        let guard = self.events.lock().unwrap();
        guard
            .as_ref()
            .expect("venue not connected")
            .send(event)
            .unwrap();
    }
}

#[derive(Default)]
struct FakeMarketVenue {
    probe: VenueProbe,
    connected: bool,
}

impl FakeMarketVenue {
    fn new() -> (Self, VenueProbe) {
        let probe = VenueProbe::default();
        (
            Self {
                probe: probe.clone(),
                connected: false,
            },
            probe,
        )
    }
}

impl MarketVenue for FakeMarketVenue {
    fn connect(
        &mut self,
        events: Sender<MarketVenueEvent>,
        _params: &HashMap<String, String>,
    ) -> Result<(), TradingError> {
        self.connected = true;
        *self.probe.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.probe.events.lock().unwrap().take();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open_level1(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError> {
        self.probe
            .level1_opens
            .lock()
            .unwrap()
            .push((instrument.clone(), delayed));
        Ok(())
    }

    fn close_level1(&mut self, instrument: &Instrument) {
        self.probe
            .level1_closes
            .lock()
            .unwrap()
            .push(instrument.clone());
    }

    fn open_depth(&mut self, instrument: &Instrument, delayed: bool) -> Result<(), TradingError> {
        self.probe
            .depth_opens
            .lock()
            .unwrap()
            .push((instrument.clone(), delayed));
        Ok(())
    }

    fn close_depth(&mut self, instrument: &Instrument) {
        self.probe
            .depth_closes
            .lock()
            .unwrap()
            .push(instrument.clone());
    }

    fn server_time(&self) -> Result<chrono::DateTime<Utc>, TradingError> {
        Ok(Utc::now())
    }
}

struct TaggedListener {
    tag: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Level1QuoteListener for TaggedListener {
    fn quote_received(&self, _quote: &Level1Quote) {
        self.log.lock().unwrap().push(self.tag);
    }
}

struct PanickingListener;

impl Level1QuoteListener for PanickingListener {
    fn quote_received(&self, _quote: &Level1Quote) {
        panic!("bad listener");
    }
}

struct ChannelListener {
    notify: Sender<Level1Quote>,
}

impl Level1QuoteListener for ChannelListener {
    fn quote_received(&self, quote: &Level1Quote) {
        let _ = self.notify.send(quote.clone());
    }
}

struct DepthChannelListener {
    notify: Sender<MarketDepthQuote>,
}

impl Level2QuoteListener for DepthChannelListener {
    fn depth_received(&self, quote: &MarketDepthQuote) {
        let _ = self.notify.send(quote.clone());
    }
}

struct ErrorChannelListener {
    notify: Sender<QuoteError>,
}

impl QuoteErrorListener for ErrorChannelListener {
    fn quote_error(&self, error: &QuoteError) {
        let _ = self.notify.send(error.clone());
    }
}

/// Subscribes another listener from inside a quote callback.
struct SelfExpandingListener {
    engine: QuoteEngine,
    instrument: Instrument,
    to_add: Mutex<Option<Arc<dyn Level1QuoteListener>>>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Level1QuoteListener for SelfExpandingListener {
    fn quote_received(&self, _quote: &Level1Quote) {
        self.log.lock().unwrap().push("expander");
        if let Some(listener) = self.to_add.lock().unwrap().take() {
            self.engine
                .subscribe_level1(&self.instrument, listener)
                .unwrap();
        }
    }
}

fn stock(symbol: &str) -> Instrument {
    Instrument::Stock(SymbolId::new(symbol, "TEST"))
}

fn level1(instrument: &Instrument, bid: f64, ask: f64) -> Level1Quote {
    let mut values = HashMap::new();
    values.insert(QuoteType::Bid, bid);
    values.insert(QuoteType::Ask, ask);
    Level1Quote::new(instrument.clone(), Utc::now(), values)
}

fn started_engine() -> (QuoteEngine, VenueProbe) {
    let (venue, probe) = FakeMarketVenue::new();
    let engine = QuoteEngine::new(Box::new(venue));
    engine.start_engine().unwrap();
    (engine, probe)
}

#[test]
fn starting_twice_is_an_error() {
    let (engine, _probe) = started_engine();
    assert!(matches!(
        engine.start_engine(),
        Err(TradingError::Configuration(_))
    ));
    assert!(engine.started());
    assert!(engine.is_connected());
}

#[test]
fn stop_is_idempotent_and_releases_the_connection() {
    let (engine, _probe) = started_engine();
    engine.stop_engine();
    engine.stop_engine();
    assert!(!engine.started());
    assert!(matches!(
        engine.server_time(),
        Err(TradingError::Connectivity(_))
    ));
}

#[test]
fn engine_can_restart_after_stop() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let (tx, _rx) = std::sync::mpsc::channel();
    engine
        .subscribe_level1(&es, Arc::new(ChannelListener { notify: tx }))
        .unwrap();

    engine.stop_engine();
    engine.start_engine().unwrap();
    assert!(engine.is_connected());
    // The surviving registration opens its venue feed again on restart.
    assert_eq!(probe.level1_opens.lock().unwrap().len(), 2);
    engine.stop_engine();
}

#[test]
fn first_subscriber_opens_the_feed_and_last_one_closes_it() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let a: Arc<dyn Level1QuoteListener> = Arc::new(TaggedListener {
        tag: "a",
        log: Arc::new(Mutex::new(Vec::new())),
    });
    let b: Arc<dyn Level1QuoteListener> = Arc::new(TaggedListener {
        tag: "b",
        log: Arc::new(Mutex::new(Vec::new())),
    });

    engine.subscribe_level1(&es, a.clone()).unwrap();
    engine.subscribe_level1(&es, b.clone()).unwrap();
    assert_eq!(probe.level1_opens.lock().unwrap().len(), 1);

    engine.unsubscribe_level1(&es, &a);
    assert!(probe.level1_closes.lock().unwrap().is_empty());

    engine.unsubscribe_level1(&es, &b);
    assert_eq!(*probe.level1_closes.lock().unwrap(), vec![es]);
}

#[test]
fn unsubscribing_an_unknown_listener_is_a_noop() {
    let (engine, probe) = started_engine();
    let never_subscribed: Arc<dyn Level1QuoteListener> = Arc::new(TaggedListener {
        tag: "x",
        log: Arc::new(Mutex::new(Vec::new())),
    });
    engine.unsubscribe_level1(&stock("ES"), &never_subscribed);
    assert!(probe.level1_closes.lock().unwrap().is_empty());
}

#[test]
fn subscriptions_registered_before_start_open_at_start() {
    let (venue, probe) = FakeMarketVenue::new();
    let engine = QuoteEngine::new(Box::new(venue));
    let es = stock("ES");
    let listener: Arc<dyn Level1QuoteListener> = Arc::new(TaggedListener {
        tag: "early",
        log: Arc::new(Mutex::new(Vec::new())),
    });
    engine.subscribe_level1(&es, listener).unwrap();
    assert!(probe.level1_opens.lock().unwrap().is_empty());

    engine.start_engine().unwrap();
    assert_eq!(*probe.level1_opens.lock().unwrap(), vec![(es, false)]);
}

#[test]
fn delayed_preference_applies_to_future_subscriptions_only() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let nq = stock("NQ");
    let listener = || -> Arc<dyn Level1QuoteListener> {
        Arc::new(TaggedListener {
            tag: "l",
            log: Arc::new(Mutex::new(Vec::new())),
        })
    };

    engine.subscribe_level1(&es, listener()).unwrap();
    engine.use_delayed_data(true);
    engine.subscribe_level1(&nq, listener()).unwrap();

    let opens = probe.level1_opens.lock().unwrap();
    assert_eq!(*opens, vec![(es, false), (nq, true)]);
}

#[test]
fn a_feed_opened_by_a_subscriber_is_not_reopened_by_the_start_path() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let (tx, _rx) = std::sync::mpsc::channel();
    engine
        .subscribe_level1(&es, Arc::new(ChannelListener { notify: tx }))
        .unwrap();
    assert_eq!(probe.level1_opens.lock().unwrap().len(), 1);

    // Replay the pre-registered-feed sweep that runs during start; the
    // feed the subscriber already opened must be skipped.
    engine.open_registered_feeds();
    assert_eq!(probe.level1_opens.lock().unwrap().len(), 1);
}

#[test]
fn quotes_route_only_to_their_instruments_listeners() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let nq = stock("NQ");
    let (tx_es, rx_es) = std::sync::mpsc::channel();
    let (tx_nq, rx_nq) = std::sync::mpsc::channel();
    engine
        .subscribe_level1(&es, Arc::new(ChannelListener { notify: tx_es }))
        .unwrap();
    engine
        .subscribe_level1(&nq, Arc::new(ChannelListener { notify: tx_nq }))
        .unwrap();

    probe.send(MarketVenueEvent::Level1(level1(&es, 10.0, 10.5)));

    let received = rx_es.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received.instrument(), &es);
    assert_eq!(received.value(QuoteType::Bid).unwrap(), 10.0);
    assert!(rx_nq.recv_timeout(Duration::from_millis(100)).is_err());
    engine.stop_engine();
}

#[test]
fn listeners_receive_quotes_in_registration_order() {
    let (engine, _probe) = started_engine();
    let es = stock("ES");
    let log = Arc::new(Mutex::new(Vec::new()));
    engine
        .subscribe_level1(
            &es,
            Arc::new(TaggedListener {
                tag: "first",
                log: log.clone(),
            }),
        )
        .unwrap();
    engine
        .subscribe_level1(
            &es,
            Arc::new(TaggedListener {
                tag: "second",
                log: log.clone(),
            }),
        )
        .unwrap();

    engine.fire_level1_quote(&level1(&es, 10.0, 10.5));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn a_failing_listener_does_not_stop_delivery_and_is_reported() {
    let (engine, _probe) = started_engine();
    let es = stock("ES");
    let log = Arc::new(Mutex::new(Vec::new()));
    let (err_tx, err_rx) = std::sync::mpsc::channel();
    engine.add_error_listener(Arc::new(ErrorChannelListener { notify: err_tx }));
    engine.subscribe_level1(&es, Arc::new(PanickingListener)).unwrap();
    engine
        .subscribe_level1(
            &es,
            Arc::new(TaggedListener {
                tag: "survivor",
                log: log.clone(),
            }),
        )
        .unwrap();

    engine.fire_level1_quote(&level1(&es, 10.0, 10.5));

    assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    let reported = err_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(reported.code(), ErrorCode::ListenerFailure);
    assert_eq!(reported.instrument(), Some(&es));
}

#[test]
fn listener_added_during_dispatch_misses_the_inflight_event() {
    let (engine, _probe) = started_engine();
    let es = stock("ES");
    let log = Arc::new(Mutex::new(Vec::new()));
    let late: Arc<dyn Level1QuoteListener> = Arc::new(TaggedListener {
        tag: "late",
        log: log.clone(),
    });
    engine
        .subscribe_level1(
            &es,
            Arc::new(SelfExpandingListener {
                engine: engine.clone(),
                instrument: es.clone(),
                to_add: Mutex::new(Some(late)),
                log: log.clone(),
            }),
        )
        .unwrap();

    engine.fire_level1_quote(&level1(&es, 10.0, 10.5));
    assert_eq!(*log.lock().unwrap(), vec!["expander"]);

    engine.fire_level1_quote(&level1(&es, 10.1, 10.6));
    assert_eq!(*log.lock().unwrap(), vec!["expander", "expander", "late"]);
}

#[test]
fn depth_subscriptions_are_independent_of_level1() {
    let (engine, probe) = started_engine();
    let es = stock("ES");
    let (tx, rx) = std::sync::mpsc::channel();
    engine
        .subscribe_market_depth(&es, Arc::new(DepthChannelListener { notify: tx }))
        .unwrap();
    assert_eq!(probe.depth_opens.lock().unwrap().len(), 1);
    assert!(probe.level1_opens.lock().unwrap().is_empty());

    probe.send(MarketVenueEvent::Depth(MarketDepthQuote::new(
        es.clone(),
        QuoteSide::Bid,
        0,
        10.0,
        25.0,
        Utc::now(),
    )));
    let entry = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(entry.side(), QuoteSide::Bid);
    assert_eq!(entry.level(), 0);
    engine.stop_engine();
}

#[test]
fn venue_disconnect_is_reported_on_the_error_channel() {
    let (engine, probe) = started_engine();
    let (tx, rx) = std::sync::mpsc::channel();
    engine.add_error_listener(Arc::new(ErrorChannelListener { notify: tx }));

    probe.send(MarketVenueEvent::Disconnected);
    let error = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(error.code(), ErrorCode::ConnectionLost);
    assert!(engine.started());
    assert!(!engine.is_connected());
}

#[test]
fn venue_errors_are_fanned_out() {
    let (engine, probe) = started_engine();
    let (tx, rx) = std::sync::mpsc::channel();
    engine.add_error_listener(Arc::new(ErrorChannelListener { notify: tx }));

    probe.send(MarketVenueEvent::Error(QuoteError::new(
        ErrorCode::DataUnavailable,
        "feed outage",
    )));
    let error = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(error.code(), ErrorCode::DataUnavailable);
    assert_eq!(error.message(), "feed outage");
    engine.stop_engine();
}
