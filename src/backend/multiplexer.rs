//! Request multiplexer: the entry point used by transport handlers.
//!
//! # Query Lifecycle
//! ```text
//! align range → acquire admission slot → allocate RequestId → encode
//!     → select connection → register → send
//!         send failed : write error to sink, remove entry     → SendFailed
//!         send ok     : wait for the dispatcher's completion  → outcome
//!         deadline    : remove entry, write timeout message    → TimedOut
//! admission slot released on every path (permit drop)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::admission::AdmissionController;
use crate::backend::correlation::{CorrelationTable, QueryOutcome, Registration, RequestId};
use crate::backend::dispatcher::ResponseDispatcher;
use crate::backend::pool::{BackendReader, BackendWriter, ConnectionPool};
use crate::config::BackendConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::protocol::types::QUERY_VERSION;
use crate::protocol::{encode_request, QueryRequest};
use crate::sink::ResultSink;

/// Highest supported resolution exponent.
pub const MAX_POINT_WIDTH: u8 = 63;

/// A time range at a given resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
    pub point_width: u8,
}

impl TimeRange {
    pub fn new(start: i64, end: i64, point_width: u8) -> Self {
        Self {
            start,
            end,
            point_width: point_width.min(MAX_POINT_WIDTH),
        }
    }

    /// Snap the range onto `2^point_width` buckets.
    ///
    /// The start is floored; the end is moved to the start of the bucket
    /// after the one containing it, making the original end inclusive. An
    /// end past `i64::MAX` is clamped to the last representable bucket
    /// boundary.
    pub fn align(self) -> TimeRange {
        let width = 1i128 << self.point_width;
        let start = (self.start as i128).div_euclid(width) * width;
        let end = ((self.end as i128).div_euclid(width) + 1) * width;
        let last_boundary = (i64::MAX as i128).div_euclid(width) * width;

        TimeRange {
            start: start as i64,
            end: end.min(last_boundary) as i64,
            point_width: self.point_width,
        }
    }
}

/// One statistical-range query from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesQuery {
    pub series: Uuid,
    pub range: TimeRange,
}

/// Tuning knobs for a [`Multiplexer`].
#[derive(Debug, Clone)]
pub struct MultiplexerOptions {
    pub max_pending: usize,
    /// Default deadline applied by [`Multiplexer::query`].
    pub request_timeout: Option<Duration>,
}

impl Default for MultiplexerOptions {
    fn default() -> Self {
        Self {
            max_pending: 8,
            request_timeout: None,
        }
    }
}

impl From<&BackendConfig> for MultiplexerOptions {
    fn from(config: &BackendConfig) -> Self {
        Self {
            max_pending: config.max_pending,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Multiplexes client queries over a small pool of backend connections.
pub struct Multiplexer {
    pool: Arc<ConnectionPool>,
    table: Arc<CorrelationTable>,
    admission: AdmissionController,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
    shutdown: Arc<Shutdown>,
    dispatchers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Multiplexer {
    /// Connect to the configured backend and start one dispatcher per connection.
    pub async fn connect(config: &BackendConfig) -> GatewayResult<Self> {
        let (pool, readers) = ConnectionPool::connect(
            &config.address,
            config.connections,
            Duration::from_secs(config.connect_timeout_secs),
        )
        .await?;
        Ok(Self::start(pool, readers, config.into()))
    }

    /// Start over already-established transports.
    pub fn from_transports(
        transports: Vec<(BackendReader, BackendWriter)>,
        options: MultiplexerOptions,
    ) -> Self {
        let (pool, readers) = ConnectionPool::from_transports(transports);
        Self::start(pool, readers, options)
    }

    fn start(pool: ConnectionPool, readers: Vec<BackendReader>, options: MultiplexerOptions) -> Self {
        let pool = Arc::new(pool);
        let table = Arc::new(CorrelationTable::new());
        let shutdown = Arc::new(Shutdown::new());

        let dispatchers = readers
            .into_iter()
            .enumerate()
            .map(|(index, reader)| {
                metrics::record_backend_connection(index, true);
                let dispatcher = ResponseDispatcher::new(
                    index,
                    reader,
                    pool.clone(),
                    table.clone(),
                    shutdown.clone(),
                );
                tokio::spawn(dispatcher.run())
            })
            .collect();

        tracing::info!(
            connections = pool.len(),
            max_pending = options.max_pending,
            request_timeout_ms = options.request_timeout.map(|d| d.as_millis() as u64),
            "Request multiplexer started"
        );

        Self {
            pool,
            table,
            admission: AdmissionController::new(options.max_pending),
            next_id: AtomicU64::new(0),
            request_timeout: options.request_timeout,
            shutdown,
            dispatchers: std::sync::Mutex::new(dispatchers),
        }
    }

    /// Run a query with the configured default deadline.
    ///
    /// Returns once `sink` has received either an error message or the
    /// complete JSON result.
    pub async fn query(&self, query: SeriesQuery, sink: Arc<dyn ResultSink>) -> QueryOutcome {
        self.query_with_timeout(query, sink, self.request_timeout)
            .await
    }

    /// Run a query with an explicit deadline (`None` waits indefinitely).
    pub async fn query_with_timeout(
        &self,
        query: SeriesQuery,
        sink: Arc<dyn ResultSink>,
        timeout: Option<Duration>,
    ) -> QueryOutcome {
        let started = Instant::now();
        let outcome = self.run_query(query, sink, timeout).await;
        metrics::record_query(outcome.label(), started);
        outcome
    }

    async fn run_query(
        &self,
        query: SeriesQuery,
        sink: Arc<dyn ResultSink>,
        timeout: Option<Duration>,
    ) -> QueryOutcome {
        let range = query.range.align();

        let _permit = match self.admission.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                sink.write_chunk(e.to_string().as_bytes());
                return QueryOutcome::Stopped;
            }
        };

        self.send_admitted(
            SeriesQuery {
                series: query.series,
                range,
            },
            sink,
            timeout,
        )
        .await
    }

    /// Register, send and wait for an admitted query whose range is aligned.
    async fn send_admitted(
        &self,
        query: SeriesQuery,
        sink: Arc<dyn ResultSink>,
        timeout: Option<Duration>,
    ) -> QueryOutcome {
        let range = query.range;
        let id = self.next_request_id();
        let frame = encode_request(&QueryRequest {
            echo_tag: id,
            series: query.series,
            start_time: range.start,
            end_time: range.end,
            point_width: range.point_width,
            version: QUERY_VERSION,
        });

        let index = self.pool.select();
        let done = self.table.register(id, index, sink);
        let _registration = Registration {
            table: &self.table,
            id,
        };

        // `stop` sets the flag before draining: either it took this entry or we see the flag.
        if self.shutdown.is_triggered() {
            if let Some(pending) = self.table.resolve(id) {
                pending.sink.write_chunk(GatewayError::Stopped.to_string().as_bytes());
                return QueryOutcome::Stopped;
            }
            return done.await.unwrap_or(QueryOutcome::Stopped);
        }

        tracing::debug!(
            request_id = id,
            connection = index,
            series = %query.series,
            start = range.start,
            end = range.end,
            point_width = range.point_width,
            "Sending query"
        );

        if let Err(e) = self.pool.send(index, &frame).await {
            // Unless the dispatcher already answered it, the entry is ours to fail.
            if let Some(pending) = self.table.resolve(id) {
                let message = format!("Could not send query to database: {e}");
                pending.sink.write_chunk(message.as_bytes());
                return QueryOutcome::SendFailed;
            }
        }

        self.wait(id, done, timeout).await
    }

    async fn wait(
        &self,
        id: RequestId,
        mut done: oneshot::Receiver<QueryOutcome>,
        timeout: Option<Duration>,
    ) -> QueryOutcome {
        let Some(limit) = timeout else {
            return done.await.unwrap_or(QueryOutcome::Stopped);
        };

        match tokio::time::timeout(limit, &mut done).await {
            Ok(result) => result.unwrap_or(QueryOutcome::Stopped),
            Err(_) => match self.table.resolve(id) {
                Some(pending) => {
                    tracing::warn!(request_id = id, timeout_ms = limit.as_millis() as u64, "Query timed out");
                    let message = format!("Request timed out after {} ms", limit.as_millis());
                    pending.sink.write_chunk(message.as_bytes());
                    QueryOutcome::TimedOut
                }
                // The dispatcher took the entry first; its signal is imminent.
                None => done.await.unwrap_or(QueryOutcome::Stopped),
            },
        }
    }

    fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Stop accepting queries, end the dispatchers and fail everything pending.
    pub fn stop(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        self.admission.close();

        let message = GatewayError::Stopped.to_string();
        let pending = self.table.drain_all();
        let count = pending.len();
        for request in pending {
            request.complete(message.as_bytes(), QueryOutcome::Stopped);
        }
        tracing::info!(drained = count, "Request multiplexer stopped");
    }

    /// Stop and wait for every dispatcher task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handles = std::mem::take(
            &mut *self.dispatchers.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Dispatcher task failed");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn max_pending(&self) -> usize {
        self.admission.max_pending()
    }

    pub fn available_slots(&self) -> usize {
        self.admission.available()
    }

    /// Registered requests awaiting a backend reply.
    pub fn pending(&self) -> usize {
        self.table.len()
    }
}
