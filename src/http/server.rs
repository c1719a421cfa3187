//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/data`, `/dataws`, static plotter files
//! - Wire up middleware (tracing, request ID)
//! - Serve until shutdown, then stop the multiplexer

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::backend::Multiplexer;
use crate::config::GatewayConfig;
use crate::http::request::execute;
use crate::http::websocket::websocket_handler;
use crate::sink::DirectSink;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub multiplexer: Arc<Multiplexer>,
    pub max_body_bytes: usize,
}

/// HTTP front end of the gateway.
pub struct GatewayServer {
    router: Router,
    multiplexer: Arc<Multiplexer>,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, multiplexer: Arc<Multiplexer>) -> Self {
        let state = AppState {
            multiplexer: multiplexer.clone(),
            max_body_bytes: config.listener.max_body_bytes,
        };
        let router = Self::build_router(config, state);
        Self {
            router,
            multiplexer,
        }
    }

    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/data", any(data_handler))
            .route("/dataws", get(websocket_handler))
            .with_state(state);

        if config.static_files.enabled {
            tracing::info!(directory = %config.static_files.plotter_dir, "Serving plotter files");
            router = router.fallback_service(ServeDir::new(&config.static_files.plotter_dir));
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves, then stop the multiplexer
    /// so every outstanding query is answered.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let multiplexer = self.multiplexer.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown requested, stopping multiplexer");
            // Stop first so in-flight handlers finish and graceful shutdown can complete.
            multiplexer.stop();
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;

        self.multiplexer.shutdown().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `/data`: one query per POST body, answered in the response body.
///
/// Errors are reported in the body with status 200, like results.
async fn data_handler(State(state): State<AppState>, method: Method, body: Body) -> Response {
    if method != Method::POST {
        return "You must send a POST request to get data.".into_response();
    }

    let payload = match to_bytes(body, state.max_body_bytes).await {
        Ok(payload) => payload,
        Err(e) => return format!("Could not read received POST payload: {e}").into_response(),
    };

    let sink = DirectSink::new();
    let outcome = execute(&state.multiplexer, &payload, Arc::new(sink.clone())).await;
    tracing::debug!(outcome = outcome.label(), "Data request finished");

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        sink.take_body(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendReader, BackendWriter, MultiplexerOptions};
    use crate::protocol::{decode_request, encode_response, read_frame, Response as WireResponse};
    use crate::protocol::{StatisticalRecord, StatusCode};
    use axum::http::{Request, StatusCode as HttpStatus};
    use tokio::io::{AsyncWriteExt, BufReader};
    use tower::ServiceExt;

    /// Multiplexer over one in-memory connection answered by a scripted backend.
    fn multiplexer() -> Arc<Multiplexer> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(client);
        let transports: Vec<(BackendReader, BackendWriter)> =
            vec![(Box::new(BufReader::new(reader)), Box::new(writer))];

        tokio::spawn(async move {
            let (mut rx, mut tx) = tokio::io::split(server);
            while let Ok(frame) = read_frame(&mut rx).await {
                let Ok(request) = decode_request(&frame) else {
                    continue;
                };
                let response = WireResponse {
                    echo_tag: request.echo_tag,
                    status: StatusCode::OK,
                    records: vec![StatisticalRecord {
                        time: request.start_time,
                        min: 1.0,
                        mean: 2.0,
                        max: 3.0,
                        count: 4,
                    }],
                };
                if tx.write_all(&encode_response(&response)).await.is_err() {
                    break;
                }
            }
        });

        Arc::new(Multiplexer::from_transports(
            transports,
            MultiplexerOptions::default(),
        ))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn router() -> Router {
        GatewayServer::new(&GatewayConfig::default(), multiplexer()).router()
    }

    #[tokio::test]
    async fn test_get_is_answered_with_guidance() {
        let response = router()
            .oneshot(Request::get("/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatus::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            body_text(response).await,
            "You must send a POST request to get data."
        );
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let response = router()
            .oneshot(Request::post("/data").body(Body::from("a,b")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatus::OK);
        assert_eq!(
            body_text(response).await,
            "Four or five arguments are required; got 2"
        );
    }

    #[tokio::test]
    async fn test_query_result_in_body() {
        let response = router()
            .oneshot(
                Request::post("/data")
                    .body(Body::from(
                        "00000000-0000-0000-0000-000000000000,3000000,4000000,0",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "[[3,0,1,2,3,4]]");
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let mut config = GatewayConfig::default();
        config.listener.max_body_bytes = 8;
        let response = GatewayServer::new(&config, multiplexer())
            .router()
            .oneshot(
                Request::post("/data")
                    .body(Body::from("00000000-0000-0000-0000-000000000000,1,2,3"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(body_text(response)
            .await
            .starts_with("Could not read received POST payload"));
    }

    #[tokio::test]
    async fn test_unknown_path_without_static_files() {
        let response = router()
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
    }
}
