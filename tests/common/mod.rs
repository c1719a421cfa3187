//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use plotter_gateway::config::GatewayConfig;
use plotter_gateway::protocol::{
    decode_request, encode_response, read_frame, QueryRequest, Response, StatisticalRecord,
    StatusCode,
};
use plotter_gateway::{GatewayServer, Multiplexer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// A mock database speaking the binary query protocol.
pub struct MockDatabase {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockDatabase {
    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of requests the database held unanswered at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Start a programmable mock database on an ephemeral port.
///
/// `handler` runs on its own task per request. Its frames are written back
/// verbatim, which lets tests send stray or extra responses; an empty list
/// leaves the request unanswered.
pub async fn start_programmable_database<F, Fut>(handler: F) -> MockDatabase
where
    F: Fn(QueryRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<Response>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    let requests = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let db = MockDatabase {
        addr,
        requests: requests.clone(),
        in_flight: in_flight.clone(),
        max_in_flight: max_in_flight.clone(),
    };

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (mut reader, writer) = socket.into_split();
            let writer = Arc::new(tokio::sync::Mutex::new(writer));
            let handler = handler.clone();
            let requests = requests.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();

            tokio::spawn(async move {
                while let Ok(frame) = read_frame(&mut reader).await {
                    let request = decode_request(&frame).unwrap();
                    requests.lock().unwrap().push(request.clone());
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);

                    let handler = handler.clone();
                    let writer = writer.clone();
                    let in_flight = in_flight.clone();
                    tokio::spawn(async move {
                        let responses = handler(request).await;
                        let mut writer = writer.lock().await;
                        // Answered before counted out, so the gateway can't overshoot.
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        for response in responses {
                            let _ = writer.write_all(&encode_response(&response)).await;
                        }
                    });
                }
            });
        }
    });

    db
}

/// A database answering every query with one record stamped at the aligned start.
pub async fn start_mock_database() -> MockDatabase {
    start_programmable_database(|request| async move { vec![record_response(&request)] }).await
}

/// A database that accepts connections and immediately closes them.
pub async fn start_closing_database() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}

pub fn record_response(request: &QueryRequest) -> Response {
    Response {
        echo_tag: request.echo_tag,
        status: StatusCode::OK,
        records: vec![StatisticalRecord {
            time: request.start_time,
            min: 1.5,
            mean: 2.5,
            max: 3.5,
            count: 7,
        }],
    }
}

pub fn gateway_config(database: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.address = database.to_string();
    config.static_files.enabled = false;
    config
}

/// Connect a gateway to its database and serve it on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> SocketAddr {
    let multiplexer = Arc::new(Multiplexer::connect(&config.backend).await.unwrap());
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(&config, multiplexer);
    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    addr
}

pub const SERIES: &str = "9a4bd0a4-7e1c-4c39-9b3a-0f4a6f4f3e21";

pub async fn post_data(gateway: SocketAddr, payload: &str) -> String {
    reqwest::Client::new()
        .post(format!("http://{gateway}/data"))
        .body(payload.to_string())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}
