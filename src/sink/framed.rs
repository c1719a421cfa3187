//! Sink for one request/response cycle on a persistent WebSocket connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::sink::{ResultSink, SinkError};

/// Outbound half of a client connection that accepts whole text frames.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<(), SinkError>;
}

/// Connection-wide writer shared by every cycle on one client connection.
pub struct SocketWriter<W> {
    inner: Arc<AsyncMutex<W>>,
    closed: Arc<AtomicBool>,
}

impl<W> Clone for SocketWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<W: FrameWriter> SocketWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(AsyncMutex::new(writer)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the connection as gone; later `open` calls fail.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct FrameState<W> {
    guard: Option<OwnedMutexGuard<W>>,
    buf: BytesMut,
}

/// Frames one logical response and the caller's echo tag onto a shared socket.
///
/// The connection's write lock is held from `open` until `close`, so the two
/// frames of a cycle are never interleaved with another cycle's frames.
pub struct FramedSocketSink<W> {
    writer: SocketWriter<W>,
    tag: String,
    state: Mutex<FrameState<W>>,
}

impl<W: FrameWriter> FramedSocketSink<W> {
    pub fn new(writer: SocketWriter<W>, tag: impl Into<String>) -> Self {
        Self {
            writer,
            tag: tag.into(),
            state: Mutex::new(FrameState {
                guard: None,
                buf: BytesMut::new(),
            }),
        }
    }
}

#[async_trait]
impl<W: FrameWriter> ResultSink for FramedSocketSink<W> {
    async fn open(&self) -> Result<(), SinkError> {
        let guard = self.writer.inner.clone().lock_owned().await;
        if self.writer.is_closed() {
            return Err(SinkError::Closed);
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.guard = Some(guard);
        state.buf.clear();
        Ok(())
    }

    fn write_chunk(&self, chunk: &[u8]) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buf
            .extend_from_slice(chunk);
    }

    async fn close(&self) -> Result<(), SinkError> {
        let (guard, body) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let guard = state.guard.take().ok_or(SinkError::NotOpen)?;
            (guard, state.buf.split())
        };
        let mut guard = guard;

        let text = String::from_utf8_lossy(&body).into_owned();
        let sent = match guard.send_text(text).await {
            Ok(()) => guard.send_text(self.tag.clone()).await,
            Err(e) => Err(e),
        };
        if sent.is_err() {
            self.writer.mark_closed();
        }
        sent
    }
}
