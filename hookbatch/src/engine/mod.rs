//! 集約エンジン
//!
//! エンドポイントパイプラインの一覧を所有し、登録・削除・一時停止・再開・
//! ルーティングを提供する。設定の永続化とイベント発行もここで行う。
//!
//! 受信パスの重複は許容し、ルーティングでは登録順で最初に一致した
//! アクティブなエンドポイントが選ばれる。
//!
//! 登録・削除・一時停止・再開はテーブル更新から永続化までを
//! 1つの排他区間で行い、テーブルとストアの内容を食い違わせない。

use crate::cancel::{CancelCause, CancelContext};
use crate::error::AggregatorResult;
use crate::events::{AggregatorEvent, SharedEventBus};
use crate::pipeline::EndpointPipeline;
use crate::sink::SharedDeliverySink;
use crate::store::SharedConfigStore;
use hookbatch_common::types::{
    normalize_listen_path, EndpointConfig, EndpointCounters, EndpointSnapshot, InboundMessage,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// ルーティング結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// エンドポイントへ投入した
    Routed {
        /// 投入先のエンドポイントID
        endpoint_id: String,
    },
    /// 一致するアクティブなエンドポイントが無く破棄した
    Miss,
}

struct EndpointEntry {
    config: EndpointConfig,
    counters: Arc<EndpointCounters>,
    pipeline: EndpointPipeline,
}

impl EndpointEntry {
    fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            config: self.config.clone(),
            counters: self.counters.snapshot(),
        }
    }
}

struct EngineInner {
    /// 登録順を保持する
    endpoints: RwLock<Vec<EndpointEntry>>,
    /// 設定変更（テーブル更新 + 永続化）の排他
    changes: Mutex<()>,
    store: SharedConfigStore,
    sink: SharedDeliverySink,
    events: SharedEventBus,
    cancel: CancelContext,
}

/// 集約エンジン
#[derive(Clone)]
pub struct AggregationEngine {
    inner: Arc<EngineInner>,
}

impl AggregationEngine {
    /// 永続化済みの設定をすべて登録した状態でエンジンを作成
    ///
    /// 読み込みに失敗した場合や不正なスケジュールを持つ設定は
    /// ログに記録して読み飛ばす。
    pub async fn new(
        store: SharedConfigStore,
        sink: SharedDeliverySink,
        events: SharedEventBus,
    ) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner {
                endpoints: RwLock::new(Vec::new()),
                changes: Mutex::new(()),
                store,
                sink,
                events,
                cancel: CancelContext::new(),
            }),
        };

        let configs = match engine.inner.store.load_all().await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted endpoint configs");
                Vec::new()
            }
        };

        let mut loaded = 0usize;
        for mut config in configs {
            config.ensure_id();
            let installed = match config.validate_id() {
                Ok(()) => engine.install(config.clone()).await.map(|_| ()),
                Err(e) => Err(e.into()),
            };
            match installed {
                Ok(()) => loaded += 1,
                Err(e) => warn!(
                    endpoint_id = %config.id,
                    endpoint_name = %config.name,
                    error = %e,
                    "Skipping persisted endpoint with invalid configuration"
                ),
            }
        }
        info!(count = loaded, "Loaded persisted endpoints");

        engine
    }

    /// エンドポイントを登録
    ///
    /// IDが空なら採番する。同じIDが登録済みの場合はパイプラインを置き換える。
    /// 呼び出し元へ返るエラーはIDとスケジュール式の検証エラーのみ。
    pub async fn register_endpoint(
        &self,
        mut config: EndpointConfig,
    ) -> AggregatorResult<EndpointSnapshot> {
        config.ensure_id();
        config.validate_id()?;

        let _changes = self.inner.changes.lock().await;
        let snapshot = self.install(config.clone()).await?;
        self.persist(&config).await;
        self.inner
            .events
            .publish(AggregatorEvent::ConfigurationsChanged);

        info!(
            endpoint_id = %config.id,
            endpoint_name = %config.name,
            listen_path = %config.listen_path,
            "Registered endpoint"
        );
        Ok(snapshot)
    }

    /// エンドポイントを削除（未登録のIDなら何もせず false）
    ///
    /// 未配信のメッセージは破棄される。
    pub async fn deregister_endpoint(&self, id: &str) -> bool {
        let _changes = self.inner.changes.lock().await;
        let removed = {
            let mut endpoints = self.inner.endpoints.write().await;
            endpoints
                .iter()
                .position(|e| e.config.id == id)
                .map(|index| endpoints.remove(index))
        };
        let Some(entry) = removed else {
            debug!(endpoint_id = %id, "Deregister requested for unknown endpoint");
            return false;
        };

        entry.pipeline.teardown();
        if let Err(e) = self.inner.store.delete(id).await {
            warn!(endpoint_id = %id, error = %e, "Failed to delete persisted endpoint config");
        }
        self.inner
            .events
            .publish(AggregatorEvent::ConfigurationsChanged);

        info!(
            endpoint_id = %id,
            endpoint_name = %entry.config.name,
            discarded = entry.counters.snapshot().hook_pending,
            "Deregistered endpoint"
        );
        true
    }

    /// 受信を停止（パイプラインは動き続ける）
    pub async fn pause(&self, id: &str) -> bool {
        self.set_active(id, false).await
    }

    /// 受信を再開
    pub async fn resume(&self, id: &str) -> bool {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: &str, active: bool) -> bool {
        let _changes = self.inner.changes.lock().await;
        let config = {
            let mut endpoints = self.inner.endpoints.write().await;
            let Some(entry) = endpoints.iter_mut().find(|e| e.config.id == id) else {
                return false;
            };
            entry.config.is_active = active;
            entry.config.clone()
        };

        self.persist(&config).await;
        self.inner
            .events
            .publish(AggregatorEvent::ConfigurationsChanged);

        info!(
            endpoint_id = %id,
            active,
            "Endpoint {}",
            if active { "resumed" } else { "paused" }
        );
        true
    }

    /// 受信メッセージを一致するエンドポイントへ振り分ける
    ///
    /// 一致しない場合もエラーにはならない。配信や集約を待たずに戻る。
    pub async fn route_inbound(
        &self,
        listen_path: &str,
        body: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> RouteOutcome {
        let path = normalize_listen_path(listen_path);
        let endpoints = self.inner.endpoints.read().await;

        let Some(entry) = endpoints
            .iter()
            .find(|e| e.config.is_active && e.config.matches_path(&path))
        else {
            debug!(listen_path = %path, "No active endpoint for path; dropping message");
            return RouteOutcome::Miss;
        };

        let endpoint_id = entry.config.id.clone();
        let message = InboundMessage::new(endpoint_id.clone(), body, headers);
        if !entry.pipeline.send(message) {
            debug!(endpoint_id = %endpoint_id, "Pipeline stopped; dropping message");
            return RouteOutcome::Miss;
        }
        entry.counters.record_inbound();

        self.inner
            .events
            .publish(AggregatorEvent::EndpointStateChanged {
                endpoint_id: endpoint_id.clone(),
                counters: entry.counters.snapshot(),
            });
        RouteOutcome::Routed { endpoint_id }
    }

    /// 全エンドポイントのスナップショット（登録順）
    pub async fn list_endpoints(&self) -> Vec<EndpointSnapshot> {
        self.inner
            .endpoints
            .read()
            .await
            .iter()
            .map(EndpointEntry::snapshot)
            .collect()
    }

    /// 指定IDのスナップショット
    pub async fn get_endpoint(&self, id: &str) -> Option<EndpointSnapshot> {
        self.inner
            .endpoints
            .read()
            .await
            .iter()
            .find(|e| e.config.id == id)
            .map(EndpointEntry::snapshot)
    }

    /// イベントを購読
    pub fn subscribe(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.inner.events.subscribe()
    }

    /// 全パイプラインを停止し、タスクの終了を待つ
    ///
    /// 未配信のメッセージは破棄される。停止後のルーティングはすべて破棄になる。
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel(CancelCause::Shutdown);
        let _changes = self.inner.changes.lock().await;
        let entries = std::mem::take(&mut *self.inner.endpoints.write().await);
        let count = entries.len();
        for entry in entries {
            entry.pipeline.join().await;
        }
        info!(count, "Aggregation engine stopped");
    }

    /// パイプラインを起動してテーブルに載せる（永続化・イベント発行なし）
    async fn install(&self, config: EndpointConfig) -> AggregatorResult<EndpointSnapshot> {
        let counters = Arc::new(EndpointCounters::default());
        let pipeline = EndpointPipeline::spawn(
            &config,
            Arc::clone(&counters),
            Arc::clone(&self.inner.sink),
            Arc::clone(&self.inner.events),
            self.inner.cancel.child(),
        )?;
        let entry = EndpointEntry {
            config,
            counters,
            pipeline,
        };
        let snapshot = entry.snapshot();

        let mut endpoints = self.inner.endpoints.write().await;
        match endpoints
            .iter_mut()
            .find(|e| e.config.id == entry.config.id)
        {
            Some(existing) => {
                existing.pipeline.teardown();
                debug!(
                    endpoint_id = %entry.config.id,
                    strategy = %entry.pipeline.strategy(),
                    "Replacing endpoint pipeline"
                );
                *existing = entry;
            }
            None => {
                debug!(
                    endpoint_id = %entry.config.id,
                    strategy = %entry.pipeline.strategy(),
                    "Installed endpoint pipeline"
                );
                endpoints.push(entry);
            }
        }
        Ok(snapshot)
    }

    async fn persist(&self, config: &EndpointConfig) {
        if let Err(e) = self.inner.store.save(config).await {
            warn!(endpoint_id = %config.id, error = %e, "Failed to persist endpoint config");
        }
    }
}
