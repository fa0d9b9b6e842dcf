//! Order coordinator for one execution-venue session.
//!
//! Serializes order-ID issuance and transmission behind a scoped lock and
//! fans venue updates out to registered listeners.

pub mod broker;

pub use broker::{Broker, OrderSession};
