//! Load testing for the gateway.

use std::collections::HashSet;
use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_concurrent_queries_respect_max_pending() {
    let db = common::start_programmable_database(|request| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        vec![common::record_response(&request)]
    })
    .await;

    let mut config = common::gateway_config(db.addr);
    config.backend.connections = 2;
    config.backend.max_pending = 4;
    let gateway = common::start_gateway(config).await;

    let client = reqwest::Client::new();
    let start = Instant::now();
    let mut tasks = Vec::new();
    for i in 0..32i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let time = i * 1_000_000;
            let body = client
                .post(format!("http://{gateway}/data"))
                .body(format!("{},{},{},0", common::SERIES, time, time + 1))
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            (i, body)
        }));
    }

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body, format!("[[{i},0,1.5,2.5,3.5,7]]"));
    }

    let elapsed = start.elapsed();
    println!("32 queries through 4 slots in {:?}", elapsed);

    let requests = db.requests();
    assert_eq!(requests.len(), 32);
    assert!(db.max_in_flight() <= 4, "saw {} in flight", db.max_in_flight());

    let tags: HashSet<u64> = requests.iter().map(|r| r.echo_tag).collect();
    assert_eq!(tags.len(), 32, "request IDs must be unique");
}
