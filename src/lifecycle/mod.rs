//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → HTTP server stops accepting → multiplexer stopped
//!
//! Shutdown (shutdown.rs):
//!     Multiplexer::stop → broadcast → dispatcher loops exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
