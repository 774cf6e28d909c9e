//! 共通型定義
//!
//! EndpointConfig, InboundMessage, AggregatedBatch等のコアデータ型

use crate::error::{CommonError, CommonResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// エンドポイント設定
///
/// 1エンドポイント = 1 JSONドキュメントとして永続化される。
/// カウンタ（HookIn/HookOut/HookPending）は [`EndpointCounters`] として
/// 実行時にのみ保持し、永続化しない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// 一意識別子（空の場合は登録時に採番）
    #[serde(default)]
    pub id: String,
    /// 表示名
    pub name: String,
    /// ルーティングキーとなる受信パス
    pub listen_path: String,
    /// 集約バッチの配信先URL
    pub target_url: String,
    /// バッファ時間（秒、0 = 未使用）
    #[serde(default)]
    pub buffer_time_seconds: u64,
    /// 最大バッファ件数（0 = 未使用）
    #[serde(default)]
    pub max_buffer_size: usize,
    /// 受信を受け付けるか
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// cron式（6フィールド、秒あり）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
}

fn default_is_active() -> bool {
    true
}

impl EndpointConfig {
    /// 新しいエンドポイント設定を作成（IDは未採番、アクティブ状態）
    pub fn new(
        name: impl Into<String>,
        listen_path: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            listen_path: listen_path.into(),
            target_url: target_url.into(),
            buffer_time_seconds: 0,
            max_buffer_size: 0,
            is_active: true,
            cron_expression: None,
        }
    }

    /// バッファ時間（秒）を設定
    pub fn with_buffer_time(mut self, seconds: u64) -> Self {
        self.buffer_time_seconds = seconds;
        self
    }

    /// 最大バッファ件数を設定
    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// cron式を設定
    pub fn with_cron_expression(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    /// IDが空なら採番し、確定したIDを返す
    pub fn ensure_id(&mut self) -> &str {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        &self.id
    }

    /// IDが永続化に使える文字だけで構成されているか検証
    pub fn validate_id(&self) -> CommonResult<()> {
        if is_valid_endpoint_id(&self.id) {
            Ok(())
        } else {
            Err(CommonError::Validation(format!(
                "Endpoint id {:?} must not be empty or contain path separators, '..' or control characters",
                self.id
            )))
        }
    }

    /// 空白のみのcron式は未設定として扱う
    pub fn cron_expression(&self) -> Option<&str> {
        self.cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }

    /// 受信パスがこのエンドポイントに一致するか
    pub fn matches_path(&self, path: &str) -> bool {
        normalize_listen_path(&self.listen_path) == normalize_listen_path(path)
    }
}

/// IDをファイル名の一部として安全に使えるか
pub fn is_valid_endpoint_id(id: &str) -> bool {
    !id.trim().is_empty()
        && id != "."
        && !id.contains("..")
        && !id.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// 受信パスを正規化する
///
/// 先頭の `/` を補い、末尾の `/` を取り除く（ルート `/` は除く）。
pub fn normalize_listen_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// エンドポイントごとの観測用カウンタ
///
/// ルーティング（HookIn/HookPending加算）とフラッシュ完了
/// （HookOut加算・HookPendingリセット）から並行に更新される。
#[derive(Debug, Default)]
pub struct EndpointCounters {
    hook_in: AtomicU64,
    hook_out: AtomicU64,
    hook_pending: AtomicU64,
}

impl EndpointCounters {
    /// 受信1件を記録
    pub fn record_inbound(&self) {
        self.hook_in.fetch_add(1, Ordering::Relaxed);
        self.hook_pending.fetch_add(1, Ordering::Relaxed);
    }

    /// 配信1バッチを記録し、保留件数を0に戻す
    pub fn record_flush(&self) {
        self.hook_out.fetch_add(1, Ordering::Relaxed);
        self.hook_pending.store(0, Ordering::Relaxed);
    }

    /// 現在値のスナップショットを取得
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hook_in: self.hook_in.load(Ordering::Relaxed),
            hook_out: self.hook_out.load(Ordering::Relaxed),
            hook_pending: self.hook_pending.load(Ordering::Relaxed),
        }
    }
}

/// カウンタのスナップショット
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// 受信件数
    pub hook_in: u64,
    /// 配信バッチ数
    pub hook_out: u64,
    /// 未配信の受信件数
    pub hook_pending: u64,
}

/// 設定とカウンタを合わせた読み取り専用ビュー
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndpointSnapshot {
    /// エンドポイント設定
    #[serde(flatten)]
    pub config: EndpointConfig,
    /// カウンタ
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// 受信メッセージ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// 宛先エンドポイントID
    pub endpoint_id: String,
    /// 本文（不透明ペイロード）
    pub body: String,
    /// ヘッダー（複数値は結合済み）
    pub headers: BTreeMap<String, String>,
    /// 受信時刻
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// 現在時刻で受信メッセージを作成
    pub fn new(
        endpoint_id: impl Into<String>,
        body: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            body: body.into(),
            headers,
            received_at: Utc::now(),
        }
    }
}

/// 集約バッチ
///
/// 1回のフラッシュで1つ生成され、配信先に1度だけ渡される。
/// `count` は常に `messages` の長さと一致する。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBatch {
    endpoint_id: String,
    endpoint_name: String,
    messages: Vec<InboundMessage>,
    count: usize,
    aggregated_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_duration_secs")]
    buffer_duration: Duration,
}

impl AggregatedBatch {
    /// 受信順のメッセージ列からバッチを作成
    pub fn new(
        endpoint_id: impl Into<String>,
        endpoint_name: impl Into<String>,
        messages: Vec<InboundMessage>,
        buffer_duration: Duration,
    ) -> Self {
        let count = messages.len();
        Self {
            endpoint_id: endpoint_id.into(),
            endpoint_name: endpoint_name.into(),
            messages,
            count,
            aggregated_at: Utc::now(),
            buffer_duration,
        }
    }

    /// エンドポイントID
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    /// エンドポイント名
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    /// 受信順のメッセージ
    pub fn messages(&self) -> &[InboundMessage] {
        &self.messages
    }

    /// メッセージ件数
    pub fn count(&self) -> usize {
        self.count
    }

    /// 集約時刻
    pub fn aggregated_at(&self) -> DateTime<Utc> {
        self.aggregated_at
    }

    /// バッファに溜めていた時間
    pub fn buffer_duration(&self) -> Duration {
        self.buffer_duration
    }

    /// 空バッチか
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn serialize_duration_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
