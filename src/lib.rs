//! Plotter gateway library.
//!
//! Accepts statistical-range queries over HTTP and WebSocket and multiplexes
//! them onto a few persistent connections to a time-series database.

pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod sink;

pub use backend::{Multiplexer, MultiplexerOptions, QueryOutcome, SeriesQuery, TimeRange};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
