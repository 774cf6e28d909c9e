//! cronスケジュールによる配信の結合テスト

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hookbatch::store::MemoryConfigStore;
use hookbatch_common::types::EndpointConfig;
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::engine::create_engine;
use crate::support::http::wait_for_requests;

#[tokio::test]
async fn test_cron_endpoint_delivers_each_message_once_in_order() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let engine = create_engine(Arc::new(MemoryConfigStore::new())).await;
    engine
        .register_endpoint(
            EndpointConfig::new("Every second", "/tick", target.uri())
                .with_cron_expression("* * * * * *"),
        )
        .await
        .unwrap();

    for body in ["a", "b", "c"] {
        engine.route_inbound("/tick", body, BTreeMap::new()).await;
    }

    // 発火の境界をまたぐと複数バッチに分かれることがある
    let mut bodies = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    while bodies.len() < 3 && tokio::time::Instant::now() < deadline {
        bodies = target
            .received_requests()
            .await
            .unwrap()
            .iter()
            .flat_map(|request| {
                let batch: Value = serde_json::from_slice(&request.body).unwrap();
                assert!(batch["count"].as_u64().unwrap() > 0);
                batch["messages"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|m| m["body"].as_str().unwrap().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(bodies, vec!["a", "b", "c"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_cron_endpoint_without_messages_never_delivers() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let engine = create_engine(Arc::new(MemoryConfigStore::new())).await;
    engine
        .register_endpoint(
            EndpointConfig::new("Idle", "/idle", target.uri()).with_cron_expression("* * * * * *"),
        )
        .await
        .unwrap();

    let requests = wait_for_requests(&target, 1, Duration::from_millis(2500)).await;
    assert!(requests.is_empty());

    engine.shutdown().await;
}
