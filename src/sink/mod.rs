//! Result sinks: where formatted output for a query goes.
//!
//! # Variants
//! ```text
//! DirectSink        one buffered body per HTTP request; open/close are no-ops
//! FramedSocketSink  one request/response cycle on a shared WebSocket:
//!                     open()  → take the connection's write lock
//!                     write   → append to the cycle's frame
//!                     close() → send result frame, send echo-tag frame, unlock
//! ```
//!
//! # Design Decisions
//! - `write_chunk` never suspends, so the backend read loop never waits on a client
//! - Sinks are shared through `Arc`: the correlation table holds one reference,
//!   the transport handler keeps another to finish the cycle

pub mod direct;
pub mod framed;

use async_trait::async_trait;
use thiserror::Error;

pub use direct::DirectSink;
pub use framed::{FrameWriter, FramedSocketSink, SocketWriter};

/// Errors raised by sink framing.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client connection has gone away.
    #[error("client connection is closed")]
    Closed,

    /// `close` was called without a matching `open`.
    #[error("no frame is open")]
    NotOpen,

    /// The transport rejected a frame.
    #[error("failed to send frame: {0}")]
    Send(String),
}

/// Destination for one logical response.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Begin a logical response.
    async fn open(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Append bytes to the current response.
    fn write_chunk(&self, chunk: &[u8]);

    /// Finish the logical response.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
