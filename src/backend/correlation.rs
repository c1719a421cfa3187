//! Correlation of in-flight request IDs with their waiting callers.
//!
//! Entries are inserted by request tasks and removed by dispatcher tasks (or
//! by the request task itself on send failure, timeout or cancellation).
//! Whoever removes an entry owns the right to write its terminal output, so
//! each request is answered at most once.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::protocol::StatusCode;
use crate::sink::ResultSink;

/// Internal request identifier, sent to the backend as the echo tag.
pub type RequestId = u64;

/// Terminal outcome of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Records were formatted and written.
    Completed,
    /// The backend answered with a non-OK status.
    BackendError(StatusCode),
    /// The query could not be written to the backend.
    SendFailed,
    /// The connection carrying the query was lost before a reply arrived.
    ConnectionLost,
    /// The deadline expired before a reply arrived.
    TimedOut,
    /// The gateway was stopped.
    Stopped,
    /// The client payload could not be parsed.
    Rejected,
}

impl QueryOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Completed => "completed",
            QueryOutcome::BackendError(_) => "backend_error",
            QueryOutcome::SendFailed => "send_failed",
            QueryOutcome::ConnectionLost => "connection_lost",
            QueryOutcome::TimedOut => "timed_out",
            QueryOutcome::Stopped => "stopped",
            QueryOutcome::Rejected => "rejected",
        }
    }
}

/// A registered request awaiting its response.
pub struct PendingRequest {
    pub sink: Arc<dyn ResultSink>,
    pub done: oneshot::Sender<QueryOutcome>,
    /// Pool index the query was sent on.
    pub connection: usize,
}

impl PendingRequest {
    /// Write the terminal output and fire the completion signal.
    pub fn complete(self, output: &[u8], outcome: QueryOutcome) {
        self.sink.write_chunk(output);
        // The waiter may have been cancelled; nothing left to notify then.
        let _ = self.done.send(outcome);
    }
}

/// Map from request ID to pending request.
#[derive(Default)]
pub struct CorrelationTable {
    entries: DashMap<RequestId, PendingRequest>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return the receiver its caller waits on.
    pub fn register(
        &self,
        id: RequestId,
        connection: usize,
        sink: Arc<dyn ResultSink>,
    ) -> oneshot::Receiver<QueryOutcome> {
        let (done, rx) = oneshot::channel();
        let previous = self.entries.insert(
            id,
            PendingRequest {
                sink,
                done,
                connection,
            },
        );
        debug_assert!(previous.is_none(), "request id {id} registered twice");
        rx
    }

    /// Remove and return the entry for `id`, if it is still pending.
    pub fn resolve(&self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id).map(|(_, pending)| pending)
    }

    /// Remove every entry sent on `connection`.
    pub fn drain_connection(&self, connection: usize) -> Vec<PendingRequest> {
        let ids: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().connection == connection)
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter_map(|id| self.resolve(id)).collect()
    }

    /// Remove every entry.
    pub fn drain_all(&self) -> Vec<PendingRequest> {
        let ids: Vec<RequestId> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.resolve(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes a registration when the registering task leaves `query`.
///
/// A no-op when the entry was already resolved.
pub(crate) struct Registration<'a> {
    pub(crate) table: &'a CorrelationTable,
    pub(crate) id: RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.table.resolve(self.id).is_some() {
            tracing::debug!(request_id = self.id, "Abandoned registration removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DirectSink;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let table = CorrelationTable::new();
        let sink = DirectSink::new();
        let rx = table.register(1, 0, Arc::new(sink.clone()));
        assert_eq!(table.len(), 1);

        let pending = table.resolve(1).unwrap();
        pending.complete(b"[]", QueryOutcome::Completed);
        assert_eq!(rx.await.unwrap(), QueryOutcome::Completed);
        assert_eq!(&sink.take_body()[..], b"[]");

        assert!(table.resolve(1).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let table = CorrelationTable::new();
        assert!(table.resolve(99).is_none());
    }

    #[test]
    fn test_drain_connection_only_takes_its_entries() {
        let table = CorrelationTable::new();
        let _a = table.register(1, 0, Arc::new(DirectSink::new()));
        let _b = table.register(2, 1, Arc::new(DirectSink::new()));
        let _c = table.register(3, 0, Arc::new(DirectSink::new()));

        let mut drained: Vec<usize> = table
            .drain_connection(0)
            .iter()
            .map(|p| p.connection)
            .collect();
        drained.sort();
        assert_eq!(drained, vec![0, 0]);
        assert_eq!(table.len(), 1);
        assert!(table.resolve(2).is_some());
    }

    #[test]
    fn test_registration_guard_cleans_up() {
        let table = CorrelationTable::new();
        let _rx = table.register(5, 0, Arc::new(DirectSink::new()));
        {
            let _guard = Registration { table: &table, id: 5 };
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_register_resolve() {
        let table = Arc::new(CorrelationTable::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let id = t * 1000 + i;
                        let _rx = table.register(id, 0, Arc::new(DirectSink::new()));
                        assert!(table.resolve(id).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(table.is_empty());
    }
}
