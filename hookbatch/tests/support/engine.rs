use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hookbatch::engine::AggregationEngine;
use hookbatch::events::create_shared_event_bus;
use hookbatch::sink::HttpDeliverySink;
use hookbatch::store::{JsonFileConfigStore, MemoryConfigStore, SharedConfigStore};
use hookbatch::AppState;

/// 実HTTP配信を行うエンジンを作成する
#[allow(dead_code)]
pub async fn create_engine(store: SharedConfigStore) -> AggregationEngine {
    let sink = HttpDeliverySink::with_timeout(Duration::from_secs(5)).unwrap();
    AggregationEngine::new(store, Arc::new(sink), create_shared_event_bus()).await
}

/// メモリストアを使うアプリケーション状態
#[allow(dead_code)]
pub async fn create_test_state() -> AppState {
    let engine = create_engine(Arc::new(MemoryConfigStore::new())).await;
    AppState { engine }
}

/// 指定ディレクトリのJSONストアを使うアプリケーション状態
#[allow(dead_code)]
pub async fn create_file_backed_state(dir: &Path) -> AppState {
    let engine = create_engine(Arc::new(JsonFileConfigStore::new(dir))).await;
    AppState { engine }
}
