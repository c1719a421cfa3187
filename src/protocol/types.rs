//! Backend message types.

use uuid::Uuid;

/// Command byte for a statistical-range query.
pub const CMD_QUERY_STATISTICAL_VALUES: u8 = 1;

/// Command version sent with every query.
pub const QUERY_VERSION: u64 = 0;

/// Backend status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound statistical-range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Internal request ID, echoed back by the backend.
    pub echo_tag: u64,
    pub series: Uuid,
    /// Aligned start, nanoseconds.
    pub start_time: i64,
    /// Aligned end, nanoseconds.
    pub end_time: i64,
    pub point_width: u8,
    pub version: u64,
}

/// One aggregated bucket produced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatisticalRecord {
    /// Bucket start, nanoseconds.
    pub time: i64,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

/// Inbound response to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub echo_tag: u64,
    pub status: StatusCode,
    pub records: Vec<StatisticalRecord>,
}
