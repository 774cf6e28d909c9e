//! 受信口からHTTP配信までの結合テスト

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::engine::create_test_state;
use crate::support::http::{spawn_server, wait_for_requests};

async fn register(client: &Client, base_url: &str, body: Value) -> String {
    let response = client
        .post(format!("{}/api/endpoints", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_burst_is_delivered_as_one_batch() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let server = spawn_server(create_test_state().await).await;
    let client = Client::new();
    let id = register(
        &client,
        &server.base_url(),
        json!({
            "name": "GitHub",
            "listenPath": "/github",
            "targetUrl": format!("{}/batch", target.uri()),
            "bufferTimeSeconds": 30,
            "maxBufferSize": 3
        }),
    )
    .await;

    for i in 0..3 {
        let response = client
            .post(format!("{}/hook/github", server.base_url()))
            .header("x-github-event", "push")
            .body(format!(r#"{{"seq":{}}}"#, i))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let requests = wait_for_requests(&target, 1, Duration::from_secs(3)).await;
    assert_eq!(requests.len(), 1);
    let batch: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(batch["endpointId"], id.as_str());
    assert_eq!(batch["endpointName"], "GitHub");
    assert_eq!(batch["count"], 3);
    for i in 0..3 {
        assert_eq!(batch["messages"][i]["body"], format!(r#"{{"seq":{}}}"#, i));
        assert_eq!(batch["messages"][i]["headers"]["x-github-event"], "push");
    }

    let snapshot: Value = client
        .get(format!("{}/api/endpoints/{}", server.base_url(), id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["hookIn"], 3);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_returns_ok_without_delivery() {
    let target = MockServer::start().await;
    let server = spawn_server(create_test_state().await).await;
    let client = Client::new();

    let response = client
        .post(format!("{}/hook/nowhere", server.base_url()))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(target.received_requests().await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_failing_target_does_not_affect_other_endpoints() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;

    let server = spawn_server(create_test_state().await).await;
    let client = Client::new();
    for (name, target) in [("broken", &broken), ("healthy", &healthy)] {
        register(
            &client,
            &server.base_url(),
            json!({
                "name": name,
                "listenPath": format!("/{}", name),
                "targetUrl": target.uri(),
                "bufferTimeSeconds": 30,
                "maxBufferSize": 1
            }),
        )
        .await;
    }

    for round in 0..2 {
        for name in ["broken", "healthy"] {
            client
                .post(format!("{}/hook/{}", server.base_url(), name))
                .body(format!("{}-{}", name, round))
                .send()
                .await
                .unwrap();
        }
    }

    // 失敗した配信は再送されない
    let broken_requests = wait_for_requests(&broken, 2, Duration::from_secs(3)).await;
    let healthy_requests = wait_for_requests(&healthy, 2, Duration::from_secs(3)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broken_requests.len(), 2);
    assert_eq!(healthy_requests.len(), 2);
    assert_eq!(broken.received_requests().await.unwrap().len(), 2);

    server.stop().await;
}
