//! Client-facing transports.
//!
//! # Data Flow
//! ```text
//! POST /data   → server.rs (read body) → request.rs → DirectSink → response body
//! GET /dataws  → websocket.rs (one task per frame) → request.rs → FramedSocketSink
//! anything else → static plotter files, when enabled
//!
//! request.rs: parse payload → Multiplexer::query, or write the parse error
//! ```
//!
//! # Design Decisions
//! - Protocol-level failures are reported in the body, never as HTTP errors
//! - Both transports share one parser and one execution path

pub mod request;
pub mod server;
pub mod websocket;

pub use request::{echo_tag_of, execute, DataRequest, ParseError};
pub use server::{AppState, GatewayServer};
