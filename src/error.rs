//! Gateway error definitions.

use thiserror::Error;

/// Errors raised by the backend side of the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Opening one of the pooled connections failed.
    #[error("Could not connect to database at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection establishment exceeded the configured timeout.
    #[error("Timed out connecting to database at {0}")]
    ConnectTimeout(String),

    /// Writing a query to a backend connection failed.
    #[error("{0}")]
    Send(#[from] std::io::Error),

    /// The selected connection was already observed as closed.
    #[error("connection {0} to the database is closed")]
    ConnectionClosed(usize),

    /// The multiplexer has been stopped.
    #[error("Gateway is shutting down")]
    Stopped,
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
