//! 集約イベントバス
//!
//! エンドポイント設定の変更やカウンタ更新を
//! 管理画面などの購読者にブロードキャストするための基盤

use hookbatch_common::types::CounterSnapshot;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// イベントバスのチャネル容量
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 集約イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum AggregatorEvent {
    /// エンドポイント設定の追加・削除・一時停止・再開
    ConfigurationsChanged,
    /// エンドポイントの受信・配信状態の変化
    EndpointStateChanged {
        /// エンドポイントID
        endpoint_id: String,
        /// 変化後のカウンタ
        counters: CounterSnapshot,
    },
}

/// 集約イベントバス
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AggregatorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// 新しいイベントバスを作成
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// イベントバスを購読
    pub fn subscribe(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.sender.subscribe()
    }

    /// イベントを発行
    ///
    /// 購読者がいない場合でもエラーにはならない
    pub fn publish(&self, event: AggregatorEvent) {
        let _ = self.sender.send(event);
    }
}

/// Arc でラップされたイベントバス
pub type SharedEventBus = Arc<EventBus>;

/// 共有可能なイベントバスを作成
pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
