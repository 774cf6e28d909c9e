//! Hookbatch Server
//!
//! Webhookのバーストを受け付け、エンドポイントごとの戦略で集約して
//! 配信先へまとめて送る

#![warn(missing_docs)]

/// REST APIハンドラー（受信口・管理API）
pub mod api;

/// バッファリング戦略
pub mod buffering;

/// キャンセルコンテキスト（停止理由付き）
pub mod cancel;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// 集約エンジン
pub mod engine;

/// エラー型
pub mod error;

/// 集約イベントバス
pub mod events;

/// ロギング初期化ユーティリティ
pub mod logging;

/// エンドポイントパイプライン
pub mod pipeline;

/// サーバー起動・シャットダウン
pub mod server;

/// バッチ配信
pub mod sink;

/// エンドポイント設定の永続化
pub mod store;

/// cronトリガー
pub mod trigger;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// 集約エンジン
    pub engine: engine::AggregationEngine,
}
