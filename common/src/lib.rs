//! Hookbatch 共通クレート
//!
//! エンドポイント設定・受信メッセージ・集約バッチなどのデータ型と
//! エラー型、サーバー設定を提供する

#![warn(missing_docs)]

/// 設定構造体
pub mod config;

/// エラー型
pub mod error;

/// コアデータ型
pub mod types;
