//! Sink backing a single HTTP response body.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::sink::ResultSink;

/// Buffers everything written to it until the handler takes the body.
#[derive(Debug, Clone, Default)]
pub struct DirectSink {
    body: Arc<Mutex<BytesMut>>,
}

impl DirectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the bytes written so far, leaving the sink empty.
    pub fn take_body(&self) -> Bytes {
        let mut body = self.body.lock().unwrap_or_else(|e| e.into_inner());
        body.split().freeze()
    }

    pub fn is_empty(&self) -> bool {
        self.body.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[async_trait]
impl ResultSink for DirectSink {
    fn write_chunk(&self, chunk: &[u8]) {
        self.body
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(chunk);
    }
}
