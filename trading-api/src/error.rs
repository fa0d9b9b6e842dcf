use thiserror::Error;

/// Synchronous failure taxonomy shared across the broker and quote engine.
///
/// Venue rejections are deliberately absent: they arrive asynchronously as
/// order events with `Rejected` status, never as an `Err` from an
/// unrelated call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradingError {
    /// Not connected, or the connection was lost mid-operation.
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    /// Order-ID discipline violated: stale or unissued ID at submission,
    /// or a non-blocking lock acquisition that was denied.
    #[error("Sequencing error: {0}")]
    Sequencing(String),
    /// Unknown order ID or absent quote field.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Invalid combo ratio, subscription, or engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TradingError {
    pub fn not_connected(what: &str) -> Self {
        TradingError::Connectivity(format!("{} is not connected", what))
    }
}
