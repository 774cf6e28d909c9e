//! バッチ配信
//!
//! 集約バッチを配信先へ1回だけPOSTする。リトライは行わない。

use async_trait::async_trait;
use hookbatch_common::types::AggregatedBatch;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 配信エラー
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// バッチのシリアライズ失敗
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP接続エラー
    #[error("HTTP error: {0}")]
    Http(String),

    /// 配信先が2xx以外を返した
    #[error("Target responded with HTTP {0}")]
    Status(u16),
}

/// バッチ配信先のtrait
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// バッチを配信先URLへ1回だけ送信
    async fn deliver(
        &self,
        target_url: &str,
        batch: &AggregatedBatch,
    ) -> Result<(), DeliveryError>;
}

/// Arc でラップされた配信先
pub type SharedDeliverySink = Arc<dyn DeliverySink>;

/// HTTP POSTによる配信
///
/// バッチはcamelCaseのJSONとして送信する。
#[derive(Clone)]
pub struct HttpDeliverySink {
    client: Client,
}

impl HttpDeliverySink {
    /// タイムアウトを指定して作成
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Http(e.to_string()))?;
        Ok(Self { client })
    }

}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    async fn deliver(
        &self,
        target_url: &str,
        batch: &AggregatedBatch,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch)?;

        let response = self
            .client
            .post(target_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

/// ユニットテスト用の配信先
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// 受け取ったバッチをチャネルへ流す
    pub(crate) struct RecordingSink {
        batches: mpsc::UnboundedSender<AggregatedBatch>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingSink {
        pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<AggregatedBatch>) {
            let (batches, rx) = mpsc::unbounded_channel();
            let sink = Self {
                batches,
                delay: Duration::ZERO,
                fail: false,
            };
            (sink, rx)
        }

        /// 受信後、応答までに待つ時間
        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// 常に失敗を返す
        pub(crate) fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(
            &self,
            _target_url: &str,
            batch: &AggregatedBatch,
        ) -> Result<(), DeliveryError> {
            let _ = self.batches.send(batch.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(DeliveryError::Status(500));
            }
            Ok(())
        }
    }
}
