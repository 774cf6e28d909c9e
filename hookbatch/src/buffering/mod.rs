//! バッファリング戦略
//!
//! エンドポイント設定から戦略を1度だけ選択し、受信メッセージを
//! 受信順に溜めて、トリガー（経過時間・件数到達・cron発火）ごとに
//! フラッシュする。
//!
//! 選択の優先順位:
//! 1. `BufferTimeSeconds > 0` かつ `MaxBufferSize > 0` → 時間窓 + 最大件数
//! 2. `BufferTimeSeconds > 0` → 時間窓
//! 3. cron式あり → cronスケジュール
//! 4. いずれも該当しない → NoOp（出力なし）

use crate::cancel::{CancelCause, CancelContext};
use crate::trigger::{PeriodicTrigger, TriggerError, TriggerFire};
use futures::StreamExt;
use hookbatch_common::types::{EndpointConfig, InboundMessage};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// バッファリング戦略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferingStrategy {
    /// 前回フラッシュから `window` 経過、または `max_count` 件到達の早い方でフラッシュ
    TimeWindowWithMaxCount {
        /// 時間窓
        window: Duration,
        /// 最大件数
        max_count: usize,
    },
    /// 前回フラッシュから `window` ごとにフラッシュ
    TimeWindow {
        /// 時間窓
        window: Duration,
    },
    /// cron発火ごとにフラッシュ
    CronScheduled {
        /// cron式
        expression: String,
    },
    /// 何も出力しない
    NoOp,
}

impl BufferingStrategy {
    /// 設定のフィールドの組み合わせから戦略を決定
    pub fn from_config(config: &EndpointConfig) -> Self {
        let window = Duration::from_secs(config.buffer_time_seconds);
        match (config.buffer_time_seconds, config.max_buffer_size) {
            (secs, max) if secs > 0 && max > 0 => Self::TimeWindowWithMaxCount {
                window,
                max_count: max,
            },
            (secs, _) if secs > 0 => Self::TimeWindow { window },
            _ => match config.cron_expression() {
                Some(expr) => Self::CronScheduled {
                    expression: expr.to_string(),
                },
                None => Self::NoOp,
            },
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeWindowWithMaxCount { .. } => "time_window_with_max_count",
            Self::TimeWindow { .. } => "time_window",
            Self::CronScheduled { .. } => "cron_scheduled",
            Self::NoOp => "noop",
        }
    }

    /// 実行可能な状態にする
    ///
    /// cron式はここで検証されるため、不正な式はタスク起動前に失敗する。
    pub fn prepare(self) -> Result<PreparedStrategy, TriggerError> {
        Ok(match self {
            Self::TimeWindowWithMaxCount { window, max_count } => PreparedStrategy::Windowed {
                window,
                max_count: Some(max_count),
            },
            Self::TimeWindow { window } => PreparedStrategy::Windowed {
                window,
                max_count: None,
            },
            Self::CronScheduled { expression } => {
                PreparedStrategy::Scheduled(PeriodicTrigger::new(&expression)?)
            }
            Self::NoOp => PreparedStrategy::NoOp,
        })
    }
}

impl fmt::Display for BufferingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeWindowWithMaxCount { window, max_count } => write!(
                f,
                "{}({}s, {})",
                self.as_str(),
                window.as_secs(),
                max_count
            ),
            Self::TimeWindow { window } => write!(f, "{}({}s)", self.as_str(), window.as_secs()),
            Self::CronScheduled { expression } => write!(f, "{}({})", self.as_str(), expression),
            Self::NoOp => f.write_str(self.as_str()),
        }
    }
}

/// フラッシュの契機
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// 時間窓が経過した
    Elapsed,
    /// 最大件数に到達した
    CountReached,
    /// cronが発火した
    Scheduled(TriggerFire),
}

/// 1回のフラッシュで取り出したメッセージ
#[derive(Debug, Clone)]
pub struct Flush {
    /// 受信順のメッセージ（空の場合あり）
    pub messages: Vec<InboundMessage>,
    /// バッファを開いてからの経過時間
    pub buffered_for: Duration,
    /// 契機
    pub reason: FlushReason,
}

impl Flush {
    /// 空のフラッシュか
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 受信順（FIFO）のメッセージバッファ
#[derive(Debug)]
pub struct MessageBuffer {
    messages: Vec<InboundMessage>,
    opened_at: Instant,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    /// 空のバッファを作成
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            opened_at: Instant::now(),
        }
    }

    /// メッセージを末尾に追加し、追加後の件数を返す
    pub fn push(&mut self, message: InboundMessage) -> usize {
        self.messages.push(message);
        self.messages.len()
    }

    /// 件数
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 中身を空のバッファと入れ替えて取り出す
    pub fn take(&mut self, reason: FlushReason) -> Flush {
        let now = Instant::now();
        let buffered_for = now.duration_since(self.opened_at);
        self.opened_at = now;
        Flush {
            messages: std::mem::take(&mut self.messages),
            buffered_for,
            reason,
        }
    }
}

/// 戦略の実行ループが終了した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyExit {
    /// キャンセルされた（バッファ内のメッセージは破棄）
    Cancelled(CancelCause),
    /// 受信チャネルが閉じられた
    InboundClosed,
}

/// 実行可能な戦略
#[derive(Debug)]
pub enum PreparedStrategy {
    /// 時間窓（最大件数は任意）
    Windowed {
        /// 時間窓
        window: Duration,
        /// 最大件数
        max_count: Option<usize>,
    },
    /// cronスケジュール
    Scheduled(PeriodicTrigger),
    /// 何も出力しない
    NoOp,
}

impl PreparedStrategy {
    /// 受信チャネルを消費し、トリガーごとに `on_flush` を呼ぶ
    ///
    /// 空のフラッシュも `on_flush` に渡す。キャンセル時は最終フラッシュを
    /// 行わずにバッファを破棄する。
    pub async fn run<F>(
        self,
        inbound: &mut UnboundedReceiver<InboundMessage>,
        cancel: &CancelContext,
        on_flush: F,
    ) -> StrategyExit
    where
        F: FnMut(Flush) + Send,
    {
        match self {
            Self::Windowed { window, max_count } => {
                run_windowed(window, max_count, inbound, cancel, on_flush).await
            }
            Self::Scheduled(trigger) => run_scheduled(trigger, inbound, cancel, on_flush).await,
            Self::NoOp => discard_until_stopped(inbound, cancel).await,
        }
    }
}

async fn run_windowed<F>(
    window: Duration,
    max_count: Option<usize>,
    inbound: &mut UnboundedReceiver<InboundMessage>,
    cancel: &CancelContext,
    mut on_flush: F,
) -> StrategyExit
where
    F: FnMut(Flush) + Send,
{
    let mut buffer = MessageBuffer::new();
    let mut deadline = Instant::now() + window;

    loop {
        tokio::select! {
            biased;
            cause = cancel.cancelled() => {
                log_discard(&buffer, cause);
                return StrategyExit::Cancelled(cause);
            }
            _ = tokio::time::sleep_until(deadline) => {
                on_flush(buffer.take(FlushReason::Elapsed));
                deadline = Instant::now() + window;
            }
            message = inbound.recv() => {
                let Some(message) = message else {
                    return StrategyExit::InboundClosed;
                };
                let len = buffer.push(message);
                if max_count.is_some_and(|max| len >= max) {
                    on_flush(buffer.take(FlushReason::CountReached));
                    deadline = Instant::now() + window;
                }
            }
        }
    }
}

async fn run_scheduled<F>(
    trigger: PeriodicTrigger,
    inbound: &mut UnboundedReceiver<InboundMessage>,
    cancel: &CancelContext,
    mut on_flush: F,
) -> StrategyExit
where
    F: FnMut(Flush) + Send,
{
    let mut buffer = MessageBuffer::new();
    let expression = trigger.expression().to_string();
    let fires = trigger.into_stream(cancel.clone());
    tokio::pin!(fires);

    loop {
        tokio::select! {
            biased;
            fire = fires.next() => match fire {
                Some(Ok(fire)) => on_flush(buffer.take(FlushReason::Scheduled(fire))),
                Some(Err(e)) => {
                    error!(
                        expression = %expression,
                        discarded = buffer.len(),
                        error = %e,
                        "Schedule trigger failed; endpoint stops producing batches"
                    );
                    return discard_until_stopped(inbound, cancel).await;
                }
                // ストリームの終了はキャンセルかスケジュール切れ
                None => match cancel.cause() {
                    Some(cause) => {
                        log_discard(&buffer, cause);
                        return StrategyExit::Cancelled(cause);
                    }
                    None => {
                        info!(
                            expression = %expression,
                            discarded = buffer.len(),
                            "Schedule has no further occurrences; endpoint stops producing batches"
                        );
                        return discard_until_stopped(inbound, cancel).await;
                    }
                },
            },
            message = inbound.recv() => match message {
                Some(message) => {
                    buffer.push(message);
                }
                None => return StrategyExit::InboundClosed,
            },
        }
    }
}

async fn discard_until_stopped(
    inbound: &mut UnboundedReceiver<InboundMessage>,
    cancel: &CancelContext,
) -> StrategyExit {
    loop {
        tokio::select! {
            biased;
            cause = cancel.cancelled() => return StrategyExit::Cancelled(cause),
            message = inbound.recv() => match message {
                Some(_) => debug!("Discarding message on endpoint without output"),
                None => return StrategyExit::InboundClosed,
            },
        }
    }
}

fn log_discard(buffer: &MessageBuffer, cause: CancelCause) {
    if !buffer.is_empty() {
        info!(
            discarded = buffer.len(),
            cause = %cause,
            "Discarding buffered messages on cancellation"
        );
    }
}
