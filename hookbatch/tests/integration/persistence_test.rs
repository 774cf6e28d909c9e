//! JSONファイルストアによる再起動をまたいだ永続化テスト

use std::collections::BTreeMap;

use hookbatch::engine::RouteOutcome;
use hookbatch_common::types::EndpointConfig;
use tempfile::tempdir;

use crate::support::engine::create_file_backed_state;

#[tokio::test]
async fn test_endpoints_survive_restart() {
    let dir = tempdir().unwrap();

    let (kept_id, paused_id, removed_id) = {
        let state = create_file_backed_state(dir.path()).await;
        let engine = &state.engine;

        let kept = engine
            .register_endpoint(
                EndpointConfig::new("Kept", "/kept", "http://127.0.0.1:9/batch")
                    .with_buffer_time(30),
            )
            .await
            .unwrap();
        let paused = engine
            .register_endpoint(
                EndpointConfig::new("Paused", "/paused", "http://127.0.0.1:9/batch")
                    .with_cron_expression("0 */5 * * * *"),
            )
            .await
            .unwrap();
        let removed = engine
            .register_endpoint(EndpointConfig::new(
                "Removed",
                "/removed",
                "http://127.0.0.1:9/batch",
            ))
            .await
            .unwrap();

        assert!(engine.pause(&paused.config.id).await);
        assert!(engine.deregister_endpoint(&removed.config.id).await);

        // 受信済みのカウンタは永続化されない
        engine
            .route_inbound("/kept", "x", BTreeMap::new())
            .await;
        engine.shutdown().await;

        (kept.config.id, paused.config.id, removed.config.id)
    };

    assert!(dir.path().join(format!("hook_{}.json", kept_id)).exists());
    assert!(!dir.path().join(format!("hook_{}.json", removed_id)).exists());

    let state = create_file_backed_state(dir.path()).await;
    let endpoints = state.engine.list_endpoints().await;
    assert_eq!(endpoints.len(), 2);

    let kept = state.engine.get_endpoint(&kept_id).await.unwrap();
    assert_eq!(kept.config.name, "Kept");
    assert_eq!(kept.config.buffer_time_seconds, 30);
    assert_eq!(kept.counters.hook_in, 0);

    let paused = state.engine.get_endpoint(&paused_id).await.unwrap();
    assert!(!paused.config.is_active);
    assert_eq!(paused.config.cron_expression(), Some("0 */5 * * * *"));

    assert!(state.engine.get_endpoint(&removed_id).await.is_none());
    assert_eq!(
        state
            .engine
            .route_inbound("/paused", "x", BTreeMap::new())
            .await,
        RouteOutcome::Miss
    );

    state.engine.shutdown().await;
}

#[tokio::test]
async fn test_hand_written_documents_are_loaded() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("hook_manual.json"),
        r#"{
            "name": "Manual",
            "listenPath": "manual",
            "targetUrl": "http://127.0.0.1:9/batch",
            "bufferTimeSeconds": 10
        }"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("hook_broken.json"), "{").unwrap();

    let state = create_file_backed_state(dir.path()).await;
    let endpoints = state.engine.list_endpoints().await;
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].config.id, "manual");

    let outcome = state
        .engine
        .route_inbound("/manual", "x", BTreeMap::new())
        .await;
    assert_eq!(
        outcome,
        RouteOutcome::Routed {
            endpoint_id: "manual".to_string()
        }
    );

    state.engine.shutdown().await;
}
