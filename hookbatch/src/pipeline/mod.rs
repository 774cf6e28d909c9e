//! エンドポイントパイプライン
//!
//! 1エンドポイントにつき1つのバックグラウンドタスクを持ち、
//! 受信メッセージをバッファリング戦略に従って集約し、配信先へ渡す。
//!
//! - 空のフラッシュは配信しない
//! - 配信は前回の配信完了を待たずに開始する（リトライなし）
//! - 停止時はバッファ内のメッセージを配信せずに破棄する

use crate::buffering::{BufferingStrategy, Flush, StrategyExit};
use crate::cancel::{CancelCause, CancelContext};
use crate::events::{AggregatorEvent, SharedEventBus};
use crate::sink::SharedDeliverySink;
use crate::trigger::TriggerError;
use hookbatch_common::types::{AggregatedBatch, EndpointConfig, EndpointCounters, InboundMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// 実行中のエンドポイントパイプライン
#[derive(Debug)]
pub struct EndpointPipeline {
    endpoint_id: String,
    strategy: BufferingStrategy,
    sender: mpsc::UnboundedSender<InboundMessage>,
    cancel: CancelContext,
    handle: JoinHandle<()>,
}

impl EndpointPipeline {
    /// 設定から戦略を選択し、パイプラインタスクを起動する
    ///
    /// cron式が不正な場合はタスクを起動せずにエラーを返す。
    pub fn spawn(
        config: &EndpointConfig,
        counters: Arc<EndpointCounters>,
        sink: SharedDeliverySink,
        events: SharedEventBus,
        cancel: CancelContext,
    ) -> Result<Self, TriggerError> {
        let strategy = BufferingStrategy::from_config(config);
        let prepared = strategy.clone().prepare()?;

        let (sender, mut inbound) = mpsc::unbounded_channel();
        let dispatcher = BatchDispatcher {
            endpoint_id: config.id.clone(),
            endpoint_name: config.name.clone(),
            target_url: config.target_url.clone(),
            counters,
            sink,
            events,
        };

        let span = info_span!(
            "endpoint_pipeline",
            endpoint_id = %config.id,
            strategy = %strategy
        );
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(
            async move {
                debug!("Pipeline started");
                let exit = prepared
                    .run(&mut inbound, &task_cancel, |flush| dispatcher.dispatch(flush))
                    .await;
                match exit {
                    StrategyExit::Cancelled(cause) => {
                        info!(cause = %cause, "Pipeline stopped");
                    }
                    StrategyExit::InboundClosed => {
                        debug!("Pipeline inbound closed");
                    }
                }
            }
            .instrument(span),
        );

        Ok(Self {
            endpoint_id: config.id.clone(),
            strategy,
            sender,
            cancel,
            handle,
        })
    }

    /// 選択された戦略
    pub fn strategy(&self) -> &BufferingStrategy {
        &self.strategy
    }

    /// メッセージを投入（パイプラインが停止済みなら false）
    pub fn send(&self, message: InboundMessage) -> bool {
        !self.cancel.is_cancelled() && self.sender.send(message).is_ok()
    }

    /// パイプラインを停止（バッファは破棄）
    pub fn teardown(&self) {
        self.cancel.cancel(CancelCause::Teardown);
    }

    /// タスクの終了を待つ
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(endpoint_id = %self.endpoint_id, error = %e, "Pipeline task panicked");
        }
    }
}

/// フラッシュ結果を配信タスクへ渡す
struct BatchDispatcher {
    endpoint_id: String,
    endpoint_name: String,
    target_url: String,
    counters: Arc<EndpointCounters>,
    sink: SharedDeliverySink,
    events: SharedEventBus,
}

impl BatchDispatcher {
    fn dispatch(&self, flush: Flush) {
        if flush.is_empty() {
            debug!(reason = ?flush.reason, "Skipping empty flush");
            return;
        }

        let batch = AggregatedBatch::new(
            self.endpoint_id.clone(),
            self.endpoint_name.clone(),
            flush.messages,
            flush.buffered_for,
        );
        let endpoint_id = self.endpoint_id.clone();
        let target_url = self.target_url.clone();
        let counters = Arc::clone(&self.counters);
        let sink = Arc::clone(&self.sink);
        let events = Arc::clone(&self.events);

        tokio::spawn(
            async move {
                match sink.deliver(&target_url, &batch).await {
                    Ok(()) => info!(
                        count = batch.count(),
                        buffered_secs = batch.buffer_duration().as_secs_f64(),
                        target = %target_url,
                        "Delivered batch"
                    ),
                    Err(e) => warn!(
                        count = batch.count(),
                        target = %target_url,
                        error = %e,
                        "Batch delivery failed"
                    ),
                }

                counters.record_flush();
                events.publish(AggregatorEvent::EndpointStateChanged {
                    endpoint_id,
                    counters: counters.snapshot(),
                });
            }
            .in_current_span(),
        );
    }
}
