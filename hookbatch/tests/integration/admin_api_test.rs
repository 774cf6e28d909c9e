//! 管理APIの結合テスト

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::support::engine::create_test_state;
use crate::support::http::spawn_server;

#[tokio::test]
async fn test_endpoint_lifecycle_over_http() {
    let server = spawn_server(create_test_state().await).await;
    let client = Client::new();
    let base = server.base_url();

    let created: Value = client
        .post(format!("{}/api/endpoints", base))
        .json(&json!({
            "name": "Stripe",
            "listenPath": "/stripe",
            "targetUrl": "http://127.0.0.1:9/batch",
            "bufferTimeSeconds": 60
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // 一時停止中は受信しても計上されない
    let paused: Value = client
        .post(format!("{}/api/endpoints/{}/pause", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paused["isActive"], false);

    let response = client
        .post(format!("{}/hook/stripe", base))
        .body("ignored")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let resumed: Value = client
        .post(format!("{}/api/endpoints/{}/resume", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resumed["isActive"], true);
    assert_eq!(resumed["hookIn"], 0);

    client
        .post(format!("{}/hook/stripe", base))
        .body("counted")
        .send()
        .await
        .unwrap();

    let list: Value = client
        .get(format!("{}/api/endpoints", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["hookIn"], 1);
    assert_eq!(list[0]["hookPending"], 1);

    let response = client
        .delete(format!("{}/api/endpoints/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/api/endpoints/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_schedule_is_rejected_over_http() {
    let server = spawn_server(create_test_state().await).await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/endpoints", server.base_url()))
        .json(&json!({
            "name": "Nightly",
            "listenPath": "/nightly",
            "targetUrl": "http://127.0.0.1:9/batch",
            "cronExpression": "0 0 * * *"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_SCHEDULE");

    let list: Value = client
        .get(format!("{}/api/endpoints", server.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.as_array().unwrap().is_empty());

    server.stop().await;
}
