use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use trading::traits::broker_venue::{BrokerVenue, BrokerVenueEvent};
use trading::{
    BrokerError, BrokerErrorListener, ErrorCode, Instrument, ListenerRegistry, OrderEvent,
    OrderEventKind, OrderEventListener, OrderId, OrderStatus, OrderTicket, Position, SessionState,
    TimeUpdateListener, TradeOrder, TradingError,
};

/// Order-ID issuance state, guarded by the order lock.
///
/// `next_id` is seeded from the venue at connect time; after that every ID
/// is a pure in-memory increment, so no network I/O happens while the lock
/// is held for issuance. `issued` holds IDs handed out but not yet
/// transmitted: submission consumes the entry, which is what makes a stale
/// or reused ID detectable.
struct Sequencer {
    next_id: Option<OrderId>,
    issued: HashSet<OrderId>,
}

struct BrokerInner {
    venue: Mutex<Box<dyn BrokerVenue>>,
    state: Mutex<SessionState>,
    sequencer: Mutex<Sequencer>,
    open_orders: Mutex<HashMap<OrderId, TradeOrder>>,
    order_listeners: ListenerRegistry<(), dyn OrderEventListener>,
    error_listeners: ListenerRegistry<(), dyn BrokerErrorListener>,
    time_listeners: ListenerRegistry<(), dyn TimeUpdateListener>,
    shutdown: AtomicBool,
    clock_interval: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Coordinates all operations that require strict ordering relative to the
/// execution venue: ID issuance, order transmission, and fan-out of the
/// venue's asynchronous responses.
///
/// Cheap to clone; clones share one venue session. Clients that need the
/// issuance/transmission ordering guarantee go through [`Broker::lock`] (or
/// the one-shot [`Broker::submit`]); everything else is callable from any
/// thread without the lock.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

/// Scoped holder of the order lock.
///
/// ID issuance and order transmission are only reachable through this
/// guard, so the lock is provably held for every `next_order_id` +
/// `place_order` pair and is released on every exit path, including errors
/// and panics. The lock is not re-entrant: a thread that already holds a
/// session and calls [`Broker::lock`] again deadlocks.
pub struct OrderSession<'a> {
    inner: &'a BrokerInner,
    sequencer: MutexGuard<'a, Sequencer>,
}

impl Broker {
    /// Creates a coordinator over the given venue connection. The session
    /// starts `Stopped`; call [`Broker::connect`] before trading.
    pub fn new(venue: Box<dyn BrokerVenue>) -> Self {
        Self::with_clock_interval(venue, Duration::from_secs(1))
    }

    /// Same as [`Broker::new`] with a custom time-update cadence. The
    /// default is once per second, sourced from the venue's clock.
    pub fn with_clock_interval(venue: Box<dyn BrokerVenue>, clock_interval: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                venue: Mutex::new(venue),
                state: Mutex::new(SessionState::Stopped),
                sequencer: Mutex::new(Sequencer {
                    next_id: None,
                    issued: HashSet::new(),
                }),
                open_orders: Mutex::new(HashMap::new()),
                order_listeners: ListenerRegistry::new(),
                error_listeners: ListenerRegistry::new(),
                time_listeners: ListenerRegistry::new(),
                shutdown: AtomicBool::new(false),
                clock_interval,
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Establishes the venue session and starts the event-dispatch and
    /// clock threads. Connecting while already connected is a no-op.
    pub fn connect(&self) -> Result<(), TradingError> {
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            match *state {
                SessionState::Connected => return Ok(()),
                SessionState::Connecting | SessionState::Reconnecting => {
                    return Err(TradingError::Connectivity(
                        "connect already in progress".into(),
                    ))
                }
                SessionState::Stopped => *state = SessionState::Connecting,
                SessionState::Disconnected => *state = SessionState::Reconnecting,
            }
        }
        // Reap workers left over from a venue-initiated disconnect, so a
        // reconnect never runs two clock threads.
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let leftovers: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.workers.lock().expect("worker list poisoned");
            guard.drain(..).collect()
        };
        for worker in leftovers {
            let _ = worker.join();
        }
        self.inner.shutdown.store(false, Ordering::SeqCst);

        let (tx, rx) = channel();
        let first_id = {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            match venue.connect(tx) {
                Ok(id) => id,
                Err(e) => {
                    let mut state = self.inner.state.lock().expect("session state poisoned");
                    *state = if *state == SessionState::Reconnecting {
                        SessionState::Disconnected
                    } else {
                        SessionState::Stopped
                    };
                    return Err(e);
                }
            }
        };

        {
            let mut seq = self.inner.sequencer.lock().expect("order lock poisoned");
            seq.next_id = Some(first_id);
            seq.issued.clear();
        }
        {
            let mut state = self.inner.state.lock().expect("session state poisoned");
            *state = SessionState::Connected;
        }

        self.spawn_dispatcher(rx)?;
        self.spawn_clock()?;
        info!("broker connected; first valid order id {}", first_id);
        Ok(())
    }

    /// Tears down the venue session. Idempotent; in-flight operations fail
    /// with a connectivity error rather than hanging, and the tracked
    /// open-order snapshot survives for inspection.
    pub fn disconnect(&self) {
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

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.workers.lock().expect("worker list poisoned");
            guard.drain(..).collect()
        };
        let current = thread::current().id();
        for worker in workers {
            // A listener callback may disconnect the broker; never join
            // the thread we are running on.
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
        info!("broker disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("session state poisoned")
            .is_connected()
    }

    /// Acquires the order lock, blocking until it is free.
    ///
    /// Every `next_order_id` + `place_order` pair must happen within one
    /// session, because the venue rejects order IDs that arrive out of the
    /// sequence they were issued in. Non-reentrant; no implicit timeout.
    pub fn lock(&self) -> OrderSession<'_> {
        OrderSession {
            inner: &self.inner,
            sequencer: self.inner.sequencer.lock().expect("order lock poisoned"),
        }
    }

    /// Non-blocking acquisition. Fails immediately with
    /// `TradingError::Sequencing` when another caller holds the lock.
    pub fn try_lock(&self) -> Result<OrderSession<'_>, TradingError> {
        match self.inner.sequencer.try_lock() {
            Ok(sequencer) => Ok(OrderSession {
                inner: &self.inner,
                sequencer,
            }),
            Err(TryLockError::WouldBlock) => Err(TradingError::Sequencing(
                "order lock is held by another caller".into(),
            )),
            Err(TryLockError::Poisoned(_)) => panic!("order lock poisoned"),
        }
    }

    /// Issues an ID, stamps it on the ticket, and transmits the order, all
    /// inside one lock scope. The preferred submission path.
    pub fn submit(&self, ticket: OrderTicket) -> Result<OrderId, TradingError> {
        let mut session = self.lock();
        let id = session.next_order_id()?;
        let order = ticket.into_order(id, Utc::now().timestamp_millis());
        session.place_order(order)?;
        Ok(id)
    }

    /// Requests cancellation of a tracked order. The final state arrives
    /// asynchronously as an order event.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<(), TradingError> {
        self.inner.require_connected()?;
        {
            let open = self.inner.open_orders.lock().expect("open orders poisoned");
            if !open.contains_key(&order_id) {
                return Err(TradingError::NotFound(format!(
                    "no open order with id {}",
                    order_id
                )));
            }
        }
        let mut venue = self.inner.venue.lock().expect("venue poisoned");
        venue.cancel_order(order_id)?;
        info!("cancel requested for order {}", order_id);
        Ok(())
    }

    /// Convenience overload of [`Broker::cancel_order`].
    pub fn cancel_order_ref(&self, order: &TradeOrder) -> Result<(), TradingError> {
        self.cancel_order(order.id())
    }

    /// Cancels `original` and submits its replacement inside one lock
    /// scope, so no other caller's order can interleave between the two.
    /// Returns the replacement's ID.
    pub fn cancel_and_replace_order(
        &self,
        original: OrderId,
        replacement: OrderTicket,
    ) -> Result<OrderId, TradingError> {
        let mut session = self.lock();
        session.cancel_and_replace(original, replacement)
    }

    /// Triggers an asynchronous status re-report from the venue and returns
    /// the last known local snapshot without waiting for the answer.
    pub fn request_order_status(&self, order_id: OrderId) -> Result<TradeOrder, TradingError> {
        let snapshot = {
            let open = self.inner.open_orders.lock().expect("open orders poisoned");
            open.get(&order_id).cloned().ok_or_else(|| {
                TradingError::NotFound(format!("no tracked order with id {}", order_id))
            })?
        };
        if self.is_connected() {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            if let Err(e) = venue.request_order_status(order_id) {
                warn!("status request for order {} failed: {}", order_id, e);
            }
        }
        Ok(snapshot)
    }

    /// Snapshot of all orders currently tracked as open.
    pub fn open_orders(&self) -> Vec<TradeOrder> {
        let open = self.inner.open_orders.lock().expect("open orders poisoned");
        open.values().cloned().collect()
    }

    /// All open positions for this session, from venue state.
    pub fn all_positions(&self) -> Result<Vec<Position>, TradingError> {
        self.inner.require_connected()?;
        let venue = self.inner.venue.lock().expect("venue poisoned");
        venue.positions()
    }

    /// The venue's current clock reading.
    pub fn current_time(&self) -> Result<DateTime<Utc>, TradingError> {
        self.inner.require_connected()?;
        let venue = self.inner.venue.lock().expect("venue poisoned");
        venue.server_time()
    }

    /// Combines two instruments into a 1:1 combo. Pure; no venue call.
    pub fn build_combo_ticker(
        first: Instrument,
        second: Instrument,
    ) -> Result<Instrument, TradingError> {
        Instrument::combo(first, second)
    }

    /// Combines two instruments with explicit leg ratios. Fails with
    /// `TradingError::Configuration` on non-positive ratios.
    pub fn build_combo_ticker_with_ratios(
        first: Instrument,
        first_ratio: u32,
        second: Instrument,
        second_ratio: u32,
    ) -> Result<Instrument, TradingError> {
        Instrument::combo_with_ratios(first, first_ratio, second, second_ratio)
    }

    pub fn add_order_event_listener(&self, listener: Arc<dyn OrderEventListener>) {
        self.inner.order_listeners.add((), listener);
    }

    pub fn remove_order_event_listener(&self, listener: &Arc<dyn OrderEventListener>) {
        self.inner.order_listeners.remove(&(), listener);
    }

    pub fn add_broker_error_listener(&self, listener: Arc<dyn BrokerErrorListener>) {
        self.inner.error_listeners.add((), listener);
    }

    pub fn remove_broker_error_listener(&self, listener: &Arc<dyn BrokerErrorListener>) {
        self.inner.error_listeners.remove(&(), listener);
    }

    pub fn add_time_update_listener(&self, listener: Arc<dyn TimeUpdateListener>) {
        self.inner.time_listeners.add((), listener);
    }

    pub fn remove_time_update_listener(&self, listener: &Arc<dyn TimeUpdateListener>) {
        self.inner.time_listeners.remove(&(), listener);
    }

    fn spawn_dispatcher(&self, rx: Receiver<BrokerVenueEvent>) -> Result<(), TradingError> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("broker-dispatch".into())
            .spawn(move || dispatch_loop(&inner, rx))
            .map_err(|e| TradingError::Connectivity(format!("failed to spawn dispatcher: {}", e)))?;
        self.inner
            .workers
            .lock()
            .expect("worker list poisoned")
            .push(handle);
        Ok(())
    }

    fn spawn_clock(&self) -> Result<(), TradingError> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("broker-clock".into())
            .spawn(move || clock_loop(&inner))
            .map_err(|e| TradingError::Connectivity(format!("failed to spawn clock: {}", e)))?;
        self.inner
            .workers
            .lock()
            .expect("worker list poisoned")
            .push(handle);
        Ok(())
    }
}

impl OrderSession<'_> {
    /// Returns a fresh, strictly increasing order ID, or a connectivity
    /// error if the venue session cannot supply one. Pure in-memory; never
    /// touches the network.
    pub fn next_order_id(&mut self) -> Result<OrderId, TradingError> {
        self.inner.require_connected()?;
        let id = self.sequencer.next_id.ok_or_else(|| {
            TradingError::Connectivity("no order-id sequence; broker was never connected".into())
        })?;
        self.sequencer.next_id = Some(id.next());
        self.sequencer.issued.insert(id);
        Ok(id)
    }

    /// Transmits an ID-stamped order and starts tracking it as open in
    /// `Pending` status.
    ///
    /// The ID must have been issued by this broker and not used before;
    /// anything else is a `TradingError::Sequencing`. A transmit failure
    /// consumes the ID all the same: retry with a fresh one, never by
    /// resubmitting the spent ID.
    pub fn place_order(&mut self, order: TradeOrder) -> Result<(), TradingError> {
        self.inner.require_connected()?;
        if !self.sequencer.issued.remove(&order.id()) {
            return Err(TradingError::Sequencing(format!(
                "order id {} was not issued by this broker or was already used",
                order.id()
            )));
        }
        let id = order.id();
        // Track before transmitting: the venue's transport thread may
        // deliver the acknowledgement before submit_order returns, and the
        // dispatcher must find the order already in the open set.
        {
            let mut open = self.inner.open_orders.lock().expect("open orders poisoned");
            open.insert(id, order.clone());
        }
        let transmitted = {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            venue.submit_order(&order)
        };
        if let Err(e) = transmitted {
            let mut open = self.inner.open_orders.lock().expect("open orders poisoned");
            open.remove(&id);
            return Err(e);
        }
        info!(
            "placed order {}: {:?} {} {}",
            id,
            order.side(),
            order.quantity(),
            order.instrument()
        );
        Ok(())
    }

    /// Cancel-then-place without releasing the lock in between.
    pub fn cancel_and_replace(
        &mut self,
        original: OrderId,
        replacement: OrderTicket,
    ) -> Result<OrderId, TradingError> {
        self.inner.require_connected()?;
        {
            let open = self.inner.open_orders.lock().expect("open orders poisoned");
            if !open.contains_key(&original) {
                return Err(TradingError::NotFound(format!(
                    "no open order with id {}",
                    original
                )));
            }
        }
        {
            let mut venue = self.inner.venue.lock().expect("venue poisoned");
            venue.cancel_order(original)?;
        }
        let id = self.next_order_id()?;
        let order = replacement.into_order(id, Utc::now().timestamp_millis());
        self.place_order(order)?;
        info!("order {} replaced by {}", original, id);
        Ok(id)
    }
}

impl BrokerInner {
    fn require_connected(&self) -> Result<(), TradingError> {
        if self.state.lock().expect("session state poisoned").is_connected() {
            Ok(())
        } else {
            Err(TradingError::not_connected("broker"))
        }
    }

    /// Applies a venue-reported status transition and fans the result out.
    fn apply_status(&self, order_id: OrderId, status: OrderStatus) {
        let event = {
            let mut open = self.open_orders.lock().expect("open orders poisoned");
            match open.get_mut(&order_id) {
                Some(order) => {
                    order.set_status(status);
                    let snapshot = order.clone();
                    if status.is_terminal() {
                        open.remove(&order_id);
                    }
                    Some(OrderEvent::new(snapshot, kind_for(status), Utc::now()))
                }
                None => None,
            }
        };
        match event {
            Some(event) => self.dispatch_order_event(&event),
            None => debug!("status update for untracked order {}", order_id),
        }
    }

    /// Applies a venue-reported execution and fans the result out.
    fn apply_execution(
        &self,
        order_id: OrderId,
        quantity: f64,
        price: f64,
        timestamp: DateTime<Utc>,
    ) {
        let event = {
            let mut open = self.open_orders.lock().expect("open orders poisoned");
            match open.get_mut(&order_id) {
                Some(order) => {
                    let status = order.apply_fill(quantity, price);
                    let snapshot = order.clone();
                    if status.is_terminal() {
                        open.remove(&order_id);
                    }
                    let kind = if status == OrderStatus::Filled {
                        OrderEventKind::Fill
                    } else {
                        OrderEventKind::PartialFill
                    };
                    Some(OrderEvent::new(snapshot, kind, timestamp))
                }
                None => None,
            }
        };
        match event {
            Some(event) => self.dispatch_order_event(&event),
            None => debug!("execution for untracked order {}", order_id),
        }
    }

    fn dispatch_order_event(&self, event: &OrderEvent) {
        let outcome = self
            .order_listeners
            .dispatch(&(), "order-event", |l| l.order_event(event));
        if outcome.failed > 0 {
            self.dispatch_broker_error(
                &BrokerError::new(
                    ErrorCode::ListenerFailure,
                    format!("{} order-event listener(s) failed", outcome.failed),
                )
                .for_order(event.order().id()),
            );
        }
    }

    fn dispatch_broker_error(&self, error: &BrokerError) {
        self.error_listeners
            .dispatch(&(), "broker-error", |l| l.broker_error(error));
    }

    /// Venue-initiated session loss: flag the state and report it on the
    /// error channel. Local order state is kept for inspection.
    fn mark_disconnected(&self, reason: &str) {
        {
            let mut state = self.state.lock().expect("session state poisoned");
            if !state.is_active() {
                return;
            }
            *state = SessionState::Disconnected;
        }
        warn!("broker connection lost: {}", reason);
        self.dispatch_broker_error(&BrokerError::new(ErrorCode::ConnectionLost, reason));
    }
}

/// Maps a bare status transition to the event kind listeners see.
fn kind_for(status: OrderStatus) -> OrderEventKind {
    match status {
        OrderStatus::Submitted => OrderEventKind::Acknowledged,
        OrderStatus::Cancelled => OrderEventKind::Cancelled,
        OrderStatus::Rejected => OrderEventKind::Rejected,
        OrderStatus::Pending | OrderStatus::PartiallyFilled | OrderStatus::Filled => {
            OrderEventKind::StatusUpdate
        }
    }
}

/// Drains the venue's event channel on a dedicated thread. The venue-read
/// path only ever enqueues, so a slow listener delays later events on this
/// channel but never stalls venue ingestion.
fn dispatch_loop(inner: &BrokerInner, rx: Receiver<BrokerVenueEvent>) {
    for event in rx {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match event {
            BrokerVenueEvent::Status { order_id, status } => inner.apply_status(order_id, status),
            BrokerVenueEvent::Execution {
                order_id,
                quantity,
                price,
                timestamp,
            } => inner.apply_execution(order_id, quantity, price, timestamp),
            BrokerVenueEvent::Error(error) => {
                warn!("venue error: {}", error.message());
                inner.dispatch_broker_error(&error);
            }
            BrokerVenueEvent::Disconnected => {
                inner.mark_disconnected("venue dropped the session");
                break;
            }
        }
    }
    debug!("broker dispatch loop ended");
}

/// Emits the venue's clock to time listeners on a fixed cadence, so
/// strategies sync off venue time rather than the local machine's.
///
/// Exits as soon as the session is no longer connected; a reconnect spawns
/// a fresh clock thread, so nothing keeps `BrokerInner` alive after the
/// last client handle is dropped.
fn clock_loop(inner: &BrokerInner) {
    loop {
        thread::sleep(inner.clock_interval);
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !inner.state.lock().expect("session state poisoned").is_connected() {
            break;
        }
        let time = {
            let venue = inner.venue.lock().expect("venue poisoned");
            venue.server_time()
        };
        match time {
            Ok(time) => {
                inner
                    .time_listeners
                    .dispatch(&(), "time-update", |l| l.time_updated(time));
            }
            Err(e) => debug!("server time unavailable: {}", e),
        }
    }
    debug!("broker clock loop ended");
}
