//! Per-connection response read loop.
//!
//! # Data Flow
//! ```text
//! backend socket → read_frame → decode_response → CorrelationTable::resolve(echo_tag)
//!     → status != OK : "Database returns status code N"  → BackendError
//!     → status == OK : format_records(records)          → Completed
//!     → unknown tag  : dropped, logged
//! ```

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::backend::correlation::{CorrelationTable, QueryOutcome};
use crate::backend::pool::{BackendReader, ConnectionPool};
use crate::format::format_records;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::protocol::{decode_response, read_frame};

/// Reads and routes every response arriving on one backend connection.
pub struct ResponseDispatcher {
    index: usize,
    reader: BackendReader,
    pool: Arc<ConnectionPool>,
    table: Arc<CorrelationTable>,
    shutdown: Arc<Shutdown>,
    stop_rx: broadcast::Receiver<()>,
}

/// Errors after which nothing more can arrive on the connection.
fn is_connection_lost(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

impl ResponseDispatcher {
    pub fn new(
        index: usize,
        reader: BackendReader,
        pool: Arc<ConnectionPool>,
        table: Arc<CorrelationTable>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let stop_rx = shutdown.subscribe();
        Self {
            index,
            reader,
            pool,
            table,
            shutdown,
            stop_rx,
        }
    }

    /// Run until the pool is stopped or the connection is lost.
    pub async fn run(mut self) {
        tracing::debug!(index = self.index, "Response dispatcher started");

        while !self.shutdown.is_triggered() {
            let frame = tokio::select! {
                _ = self.stop_rx.recv() => {
                    tracing::debug!(index = self.index, "Response dispatcher stopping");
                    break;
                }
                frame = read_frame(&mut self.reader) => frame,
            };

            match frame {
                Ok(payload) => self.dispatch(&payload),
                Err(_) if self.shutdown.is_triggered() => break,
                Err(e) if is_connection_lost(e.kind()) => {
                    tracing::error!(index = self.index, error = %e, "Lost backend connection");
                    self.fail_pending(&e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::warn!(index = self.index, error = %e, "Error in receiving response");
                    metrics::record_read_error(self.index);
                }
            }
        }

        tracing::debug!(index = self.index, "Response dispatcher exited");
    }

    /// Route one decoded payload to its waiting caller.
    fn dispatch(&self, payload: &[u8]) {
        let response = match decode_response(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(index = self.index, error = %e, "Malformed response frame");
                metrics::record_read_error(self.index);
                return;
            }
        };

        let Some(pending) = self.table.resolve(response.echo_tag) else {
            tracing::debug!(
                index = self.index,
                echo_tag = response.echo_tag,
                "Dropping response for unknown request"
            );
            metrics::record_dropped_response();
            return;
        };

        if !response.status.is_ok() {
            let message = format!("Database returns status code {}", response.status);
            pending.complete(message.as_bytes(), QueryOutcome::BackendError(response.status));
            return;
        }

        tracing::trace!(
            echo_tag = response.echo_tag,
            records = response.records.len(),
            "Response routed"
        );
        let body = format_records(&response.records);
        pending.complete(body.as_bytes(), QueryOutcome::Completed);
    }

    /// Mark the connection broken and answer everything still waiting on it.
    fn fail_pending(&self, reason: &str) {
        self.pool.mark_broken(self.index);
        let message = format!("Lost connection to database: {reason}");
        let pending = self.table.drain_connection(self.index);
        if !pending.is_empty() {
            tracing::warn!(
                index = self.index,
                count = pending.len(),
                "Failing requests pending on lost connection"
            );
        }
        for request in pending {
            request.complete(message.as_bytes(), QueryOutcome::ConnectionLost);
        }
    }
}
