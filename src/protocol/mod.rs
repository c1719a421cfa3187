//! Backend wire protocol.
//!
//! # Data Flow
//! ```text
//! Outbound:  QueryRequest → codec::encode_request → [len u32][payload] → TCP
//! Inbound:   TCP → codec::read_frame → [payload] → codec::decode_response → Response
//! ```
//!
//! # Design Decisions
//! - Every frame is length-prefixed, so a payload that fails to decode never
//!   desynchronizes the stream
//! - Big-endian integers and IEEE-754 floats throughout
//! - Only the statistical-range query command is supported

pub mod codec;
pub mod types;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_frame, CodecError,
};
pub use types::{QueryRequest, Response, StatisticalRecord, StatusCode};
