//! ロギング初期化
//!
//! `HOOKBATCH_LOG`（未設定なら `RUST_LOG`、どちらも無ければ `info`）を
//! フィルタとして tracing-subscriber の fmt レイヤーを登録する。

use hookbatch_common::error::CommonError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// デフォルトのログレベル
const DEFAULT_LEVEL: &str = "info";

/// フィルタ文字列を決定する
pub fn filter_directive() -> String {
    std::env::var("HOOKBATCH_LOG")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// グローバルなサブスクライバーを登録
///
/// 不正なフィルタ指定は `info` にフォールバックする。
/// 2回目以降の呼び出しはエラーを返す。
pub fn init() -> Result<(), CommonError> {
    let directive = filter_directive();
    let filter = EnvFilter::try_new(&directive)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LEVEL))
        .map_err(|e| CommonError::Config(format!("invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .try_init()
        .map_err(|e| CommonError::Config(format!("failed to install subscriber: {}", e)))
}
