//! Persistent WebSocket transport.
//!
//! # Data Flow
//! ```text
//! client text frame (payload)
//!     → spawned cycle task
//!         → FramedSocketSink::open (connection write lock)
//!         → request::execute (parse, multiplexer query)
//!         → FramedSocketSink::close
//!             → text frame: result JSON or error message
//!             → text frame: echo tag
//! ```
//!
//! # Design Decisions
//! - Every inbound frame is its own cycle; cycles run concurrently and
//!   finish in any order, but the two frames of one cycle are adjacent
//! - Cycles still running when the client goes away are aborted, which
//!   releases their correlation entries and admission slots

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::task::JoinSet;

use crate::backend::Multiplexer;
use crate::http::request::{echo_tag_of, execute};
use crate::http::server::AppState;
use crate::sink::{FrameWriter, FramedSocketSink, ResultSink, SinkError, SocketWriter};

type WsWriter = SplitSink<WebSocket, Message>;

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send_text(&mut self, text: String) -> Result<(), SinkError> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| SinkError::Send(e.to_string()))
    }
}

/// `GET /dataws`: upgrade and serve cycles until the client disconnects.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.multiplexer))
}

async fn handle_socket(socket: WebSocket, multiplexer: Arc<Multiplexer>) {
    let (sender, mut receiver) = socket.split();
    let writer = SocketWriter::new(sender);
    let mut cycles = JoinSet::new();

    tracing::debug!("WebSocket client connected");

    while let Some(message) = receiver.next().await {
        // Reap finished cycles so a long-lived connection doesn't accumulate them.
        while cycles.try_join_next().is_some() {}

        match message {
            Ok(Message::Text(payload)) => {
                cycles.spawn(run_cycle(
                    multiplexer.clone(),
                    writer.clone(),
                    payload.as_str().to_owned(),
                ));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    writer.mark_closed();
    cycles.shutdown().await;
    tracing::debug!("WebSocket client disconnected");
}

async fn run_cycle(multiplexer: Arc<Multiplexer>, writer: SocketWriter<WsWriter>, payload: String) {
    let sink = Arc::new(FramedSocketSink::new(writer, echo_tag_of(&payload).to_owned()));

    if let Err(e) = sink.open().await {
        tracing::warn!(error = %e, "Could not start WebSocket response");
        return;
    }

    let outcome = execute(&multiplexer, payload.as_bytes(), sink.clone()).await;

    if let Err(e) = sink.close().await {
        tracing::warn!(
            error = %e,
            outcome = outcome.label(),
            "Could not finish WebSocket response"
        );
    }
}
