//! cronによる周期トリガー
//!
//! 6フィールド（秒あり）のcron式を指定タイムゾーンで評価し、
//! キャンセル可能な発火イベントの遅延シーケンスを生成する。
//!
//! 式は作成時に解析されるため、不正なスケジュールは
//! バックグラウンドタスクの起動前に拒否される。

use crate::cancel::{CancelCause, CancelContext};
use crate::error::AggregatorError;
use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use futures::stream::{self, Stream};
use std::str::FromStr;
use thiserror::Error;

/// cron式のフィールド数
const SCHEDULE_FIELDS: usize = 6;

/// トリガーエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// 式を解析できない
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        /// 拒否された式
        expression: String,
        /// 解析エラーの内容
        reason: String,
    },

    /// 次回発火の待機に失敗した
    #[error("Trigger wait failed: {0}")]
    Wait(String),
}

impl From<TriggerError> for AggregatorError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::InvalidSchedule { expression, reason } => {
                AggregatorError::InvalidSchedule { expression, reason }
            }
            TriggerError::Wait(msg) => AggregatorError::Internal(msg),
        }
    }
}

/// 1回の発火
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerFire {
    /// 予定されていた発火時刻
    pub scheduled_at: DateTime<Utc>,
    /// 実際に発火した時刻
    pub fired_at: DateTime<Utc>,
}

/// 次回発火の待機結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// 発火した
    Fired(TriggerFire),
    /// 以降の発火が無い
    Exhausted,
    /// キャンセルにより中断された
    Cancelled(CancelCause),
}

/// cronスケジュールによる周期トリガー
#[derive(Debug, Clone)]
pub struct PeriodicTrigger<Tz: TimeZone = Utc> {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
    last_fire: Option<DateTime<Tz>>,
}

impl PeriodicTrigger<Utc> {
    /// UTCで評価するトリガーを作成
    pub fn new(expression: &str) -> Result<Self, TriggerError> {
        Self::with_timezone(expression, Utc)
    }
}

impl<Tz> PeriodicTrigger<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    /// 指定タイムゾーンで評価するトリガーを作成
    pub fn with_timezone(expression: &str, timezone: Tz) -> Result<Self, TriggerError> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        if fields != SCHEDULE_FIELDS {
            return Err(TriggerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!(
                    "expected {} fields (seconds included), found {}",
                    SCHEDULE_FIELDS, fields
                ),
            });
        }

        let schedule = Schedule::from_str(expression).map_err(|e| {
            TriggerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
            last_fire: None,
        })
    }

    /// 検証済みの式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// `after` より厳密に後の次回発火時刻
    pub fn next_occurrence_after(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }

    /// 次回発火まで待機
    ///
    /// 発火時刻は現在時刻（かつ前回発火）より厳密に後から求めるため、
    /// 処理が遅れた場合は取りこぼした回をまとめて発火せずに読み飛ばす。
    pub async fn next_fire(
        &mut self,
        cancel: &CancelContext,
    ) -> Result<TriggerEvent, TriggerError> {
        if let Some(cause) = cancel.cause() {
            return Ok(TriggerEvent::Cancelled(cause));
        }

        let now = Utc::now().with_timezone(&self.timezone);
        let after = match &self.last_fire {
            Some(last) if *last > now => last.clone(),
            _ => now.clone(),
        };

        let Some(next) = self.next_occurrence_after(&after) else {
            return Ok(TriggerEvent::Exhausted);
        };

        let wait = next
            .clone()
            .signed_duration_since(now)
            .to_std()
            .map_err(|e| TriggerError::Wait(format!("{} (next occurrence {:?})", e, next)))?;

        tokio::select! {
            biased;
            cause = cancel.cancelled() => Ok(TriggerEvent::Cancelled(cause)),
            _ = tokio::time::sleep(wait) => {
                let scheduled_at = next.with_timezone(&Utc);
                self.last_fire = Some(next);
                Ok(TriggerEvent::Fired(TriggerFire {
                    scheduled_at,
                    fired_at: Utc::now(),
                }))
            }
        }
    }

    /// 発火のストリームに変換
    ///
    /// スケジュール切れまたはキャンセルでストリームは終了する。
    /// 待機の失敗は最後の要素としてエラーを1度だけ返す。
    pub fn into_stream(
        self,
        cancel: CancelContext,
    ) -> impl Stream<Item = Result<TriggerFire, TriggerError>> + Send {
        stream::unfold(Some((self, cancel)), |state| async move {
            let (mut trigger, cancel) = state?;
            match trigger.next_fire(&cancel).await {
                Ok(TriggerEvent::Fired(fire)) => Some((Ok(fire), Some((trigger, cancel)))),
                Ok(TriggerEvent::Exhausted) | Ok(TriggerEvent::Cancelled(_)) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
