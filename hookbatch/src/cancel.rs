//! 協調キャンセル
//!
//! パイプライン内の待機箇所（トリガー待ち・バッファループ）はすべて
//! [`CancelContext::cancelled`] と select する。原因によってエンドポイント単位の
//! 停止とエンジン全体の停止を区別する。

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// キャンセルの原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// エンドポイントの削除または置き換え
    Teardown,
    /// エンジン全体の停止
    Shutdown,
}

impl CancelCause {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teardown => "teardown",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原因付きのキャンセルトークン
///
/// 子は親と一緒にキャンセルされる。直接キャンセルされていない子は
/// 最も近い祖先の原因を返す。
#[derive(Clone, Debug, Default)]
pub struct CancelContext {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
    ancestors: Vec<Arc<OnceLock<CancelCause>>>,
}

impl CancelContext {
    /// ルートのコンテキストを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// `self` のキャンセルに連動する子コンテキストを作成
    pub fn child(&self) -> Self {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(Arc::clone(&self.cause));
        ancestors.extend(self.ancestors.iter().cloned());
        Self {
            token: self.token.child_token(),
            cause: Arc::default(),
            ancestors,
        }
    }

    /// 自身と全ての子をキャンセル
    ///
    /// 最初に記録された原因が優先される。
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// 自身または祖先がキャンセル済みか
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// キャンセルの原因（未キャンセルなら None）
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.is_cancelled() {
            return None;
        }
        self.cause
            .get()
            .or_else(|| self.ancestors.iter().find_map(|c| c.get()))
            .copied()
    }

    /// キャンセルまで待機し、原因を返す
    pub async fn cancelled(&self) -> CancelCause {
        self.token.cancelled().await;
        self.cause().unwrap_or(CancelCause::Shutdown)
    }
}
