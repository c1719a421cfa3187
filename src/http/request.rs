//! Client payload parsing.
//!
//! Both transports carry the same ASCII payload:
//! `seriesID,startTime,endTime,pointWidth[,echoTag]`

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::backend::{Multiplexer, QueryOutcome, SeriesQuery, TimeRange, MAX_POINT_WIDTH};
use crate::observability::metrics;
use crate::sink::ResultSink;

/// A malformed client payload. The message is sent back verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Request payload is not valid UTF-8")]
    Encoding,

    #[error("Four or five arguments are required; got {0}")]
    FieldCount(usize),

    #[error("Invalid UUID: got {0}")]
    Uuid(String),

    #[error("Could not interpret {value} as an int64: {reason}")]
    Int64 { value: String, reason: String },

    #[error("Could not interpret {0} as a point width in [0, 63]")]
    PointWidth(String),
}

/// A parsed data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub query: SeriesQuery,
    /// Caller correlation tag, echoed only by the WebSocket transport.
    pub echo_tag: Option<String>,
}

fn parse_i64(field: &str) -> Result<i64, ParseError> {
    let field = field.trim();
    field.parse().map_err(|e: std::num::ParseIntError| ParseError::Int64 {
        value: field.to_string(),
        reason: e.to_string(),
    })
}

fn parse_point_width(field: &str) -> Result<u8, ParseError> {
    let field = field.trim();
    match field.parse::<u8>() {
        Ok(pw) if pw <= MAX_POINT_WIDTH => Ok(pw),
        _ => Err(ParseError::PointWidth(field.to_string())),
    }
}

impl FromStr for DataRequest {
    type Err = ParseError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = payload.split(',').collect();
        if !(4..=5).contains(&fields.len()) {
            return Err(ParseError::FieldCount(fields.len()));
        }

        let uuid_field = fields[0].trim();
        let series =
            Uuid::parse_str(uuid_field).map_err(|_| ParseError::Uuid(uuid_field.to_string()))?;
        let start = parse_i64(fields[1])?;
        let end = parse_i64(fields[2])?;
        let point_width = parse_point_width(fields[3])?;

        Ok(DataRequest {
            query: SeriesQuery {
                series,
                range: TimeRange::new(start, end, point_width),
            },
            echo_tag: fields.get(4).map(|tag| tag.to_string()),
        })
    }
}

impl DataRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        std::str::from_utf8(payload)
            .map_err(|_| ParseError::Encoding)?
            .parse()
    }
}

/// The echo tag of a payload, or "" when it has none.
///
/// Used before parsing so malformed requests still echo the caller's tag.
pub fn echo_tag_of(payload: &str) -> &str {
    payload.split(',').nth(4).unwrap_or("")
}

/// Parse `payload` and run it, writing either the parse error or the query
/// result to `sink`. Malformed payloads never take an admission slot.
pub async fn execute(
    multiplexer: &Multiplexer,
    payload: &[u8],
    sink: Arc<dyn ResultSink>,
) -> QueryOutcome {
    let started = Instant::now();
    match DataRequest::parse(payload) {
        Ok(request) => multiplexer.query(request.query, sink).await,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed data request");
            sink.write_chunk(e.to_string().as_bytes());
            let outcome = QueryOutcome::Rejected;
            metrics::record_query(outcome.label(), started);
            outcome
        }
    }
}
