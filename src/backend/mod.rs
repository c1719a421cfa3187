//! Backend request multiplexing subsystem.
//!
//! # Data Flow
//! ```text
//! transport handler
//!     → multiplexer.rs (align, admit, assign RequestId, encode)
//!     → admission.rs (bounded in-flight requests)
//!     → correlation.rs (RequestId → sink + completion signal)
//!     → pool.rs (round-robin connection, per-connection send lock)
//!     → backend database
//!
//! backend database
//!     → dispatcher.rs (one read loop per connection)
//!     → correlation.rs (resolve echo tag)
//!     → format.rs → sink → completion signal → multiplexer returns
//! ```
//!
//! # Design Decisions
//! - All mutable state is owned by one `Multiplexer`; no process-wide globals
//! - Reads need no lock: each connection has exactly one reader task
//! - Whoever removes a correlation entry writes that request's only answer

pub mod admission;
pub mod correlation;
pub mod dispatcher;
pub mod multiplexer;
pub mod pool;

pub use admission::{AdmissionController, AdmissionPermit};
pub use correlation::{CorrelationTable, PendingRequest, QueryOutcome, RequestId};
pub use dispatcher::ResponseDispatcher;
pub use multiplexer::{Multiplexer, MultiplexerOptions, SeriesQuery, TimeRange, MAX_POINT_WIDTH};
pub use pool::{BackendReader, BackendWriter, ConnectionPool};
