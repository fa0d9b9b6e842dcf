use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use trading::traits::broker_venue::{BrokerVenue, BrokerVenueEvent};
use trading::{
    BrokerError, ErrorCode, Instrument, OrderId, OrderStatus, OrderType, Position, Side,
    TradeOrder, TradingError,
};
use uuid::Uuid;

/// How the simulated venue answers submitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillBehavior {
    /// Acknowledge, then fill the full quantity in one execution.
    FillImmediately,
    /// Acknowledge, then fill in two partial executions.
    FillInTwo,
    /// Acknowledge, then reject.
    Reject,
}

/// Running tally of fills per instrument, kept venue-side so positions can
/// be served the way a live session would.
#[derive(Default)]
struct Ledger {
    // instrument -> (signed quantity, total signed cost)
    fills: HashMap<Instrument, (f64, f64)>,
}

impl Ledger {
    fn apply(&mut self, instrument: &Instrument, side: Side, quantity: f64, price: f64) {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let entry = self.fills.entry(instrument.clone()).or_insert((0.0, 0.0));
        entry.0 += signed;
        entry.1 += signed * price;
    }

    fn positions(&self) -> Vec<Position> {
        self.fills
            .iter()
            .filter(|(_, (qty, _))| qty.abs() > 1e-9)
            .map(|(instrument, (qty, cost))| {
                Position::new(instrument.clone(), *qty, (cost / qty).abs())
            })
            .collect()
    }
}

/// An in-process stand-in for an execution-venue session.
pub struct SimBrokerVenue {
    first_order_id: u64,
    behavior: FillBehavior,
    connected: bool,
    events: Option<Sender<BrokerVenueEvent>>,
    statuses: Arc<Mutex<HashMap<OrderId, OrderStatus>>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl SimBrokerVenue {
    pub fn new(first_order_id: u64) -> Self {
        Self::with_behavior(first_order_id, FillBehavior::FillImmediately)
    }

    pub fn with_behavior(first_order_id: u64, behavior: FillBehavior) -> Self {
        Self {
            first_order_id,
            behavior,
            connected: false,
            events: None,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    fn sender(&self) -> Result<Sender<BrokerVenueEvent>, TradingError> {
        if !self.connected {
            return Err(TradingError::not_connected("sim broker venue"));
        }
        self.events
            .clone()
            .ok_or_else(|| TradingError::not_connected("sim broker venue"))
    }
}

/// Price the sim fills at: the stated limit/stop price, or a jittered
/// reference price for market orders.
fn fill_price(order: &TradeOrder) -> f64 {
    match order.order_type() {
        OrderType::Limit(price) | OrderType::Stop(price) => *price,
        OrderType::Market => {
            let mut rng = rand::thread_rng();
            100.0 * (1.0 + rng.gen_range(-0.005..0.005))
        }
    }
}

impl BrokerVenue for SimBrokerVenue {
    fn connect(&mut self, events: Sender<BrokerVenueEvent>) -> Result<OrderId, TradingError> {
        self.connected = true;
        self.events = Some(events);
        info!(
            "sim broker venue connected; issuing ids from {}",
            self.first_order_id
        );
        Ok(OrderId::new(self.first_order_id))
    }

    fn disconnect(&mut self) {
        self.connected = false;
        // Dropping the sender closes the broker's ingestion channel.
        self.events = None;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn submit_order(&mut self, order: &TradeOrder) -> Result<(), TradingError> {
        let tx = self.sender()?;
        let behavior = self.behavior;
        let statuses = Arc::clone(&self.statuses);
        let ledger = Arc::clone(&self.ledger);
        let order = order.clone();

        // Responses come from a separate thread, like a live transport.
        thread::spawn(move || {
            let id = order.id();
            let execution = Uuid::new_v4();
            debug!("sim venue execution stream {} for order {}", execution, id);

            statuses.lock().unwrap().insert(id, OrderStatus::Submitted);
            let _ = tx.send(BrokerVenueEvent::Status {
                order_id: id,
                status: OrderStatus::Submitted,
            });

            match behavior {
                FillBehavior::Reject => {
                    statuses.lock().unwrap().insert(id, OrderStatus::Rejected);
                    let _ = tx.send(BrokerVenueEvent::Status {
                        order_id: id,
                        status: OrderStatus::Rejected,
                    });
                }
                FillBehavior::FillImmediately => {
                    let price = fill_price(&order);
                    ledger
                        .lock()
                        .unwrap()
                        .apply(order.instrument(), order.side(), order.quantity(), price);
                    statuses.lock().unwrap().insert(id, OrderStatus::Filled);
                    let _ = tx.send(BrokerVenueEvent::Execution {
                        order_id: id,
                        quantity: order.quantity(),
                        price,
                        timestamp: Utc::now(),
                    });
                }
                FillBehavior::FillInTwo => {
                    let price = fill_price(&order);
                    let half = order.quantity() / 2.0;
                    for part in [half, order.quantity() - half] {
                        ledger
                            .lock()
                            .unwrap()
                            .apply(order.instrument(), order.side(), part, price);
                        let _ = tx.send(BrokerVenueEvent::Execution {
                            order_id: id,
                            quantity: part,
                            price,
                            timestamp: Utc::now(),
                        });
                    }
                    statuses.lock().unwrap().insert(id, OrderStatus::Filled);
                }
            }
        });
        Ok(())
    }

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), TradingError> {
        let tx = self.sender()?;
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get(&order_id) {
            Some(status) if !status.is_terminal() => {
                statuses.insert(order_id, OrderStatus::Cancelled);
                let _ = tx.send(BrokerVenueEvent::Status {
                    order_id,
                    status: OrderStatus::Cancelled,
                });
                Ok(())
            }
            Some(_) => {
                let _ = tx.send(BrokerVenueEvent::Error(
                    BrokerError::new(ErrorCode::VenueRejection, "order already terminal")
                        .for_order(order_id),
                ));
                Ok(())
            }
            None => Err(TradingError::NotFound(format!(
                "sim venue knows no order {}",
                order_id
            ))),
        }
    }

    fn request_order_status(&mut self, order_id: OrderId) -> Result<(), TradingError> {
        let tx = self.sender()?;
        let statuses = self.statuses.lock().unwrap();
        match statuses.get(&order_id) {
            Some(status) => {
                let _ = tx.send(BrokerVenueEvent::Status {
                    order_id,
                    status: *status,
                });
                Ok(())
            }
            None => Err(TradingError::NotFound(format!(
                "sim venue knows no order {}",
                order_id
            ))),
        }
    }

    fn positions(&self) -> Result<Vec<Position>, TradingError> {
        if !self.connected {
            return Err(TradingError::not_connected("sim broker venue"));
        }
        Ok(self.ledger.lock().unwrap().positions())
    }

    fn server_time(&self) -> Result<DateTime<Utc>, TradingError> {
        if !self.connected {
            return Err(TradingError::not_connected("sim broker venue"));
        }
        Ok(Utc::now())
    }
}
