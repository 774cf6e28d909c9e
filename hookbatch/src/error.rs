//! エラー型定義
//!
//! 集約サーバーの統一エラー型（thiserror使用）
//!
//! 呼び出し元へ同期的に返るのはスケジュール式の検証エラーのみ。
//! 永続化・配信の失敗は各パイプライン内でログに記録して吸収する。

use axum::http::StatusCode;
use hookbatch_common::error::CommonError;
use thiserror::Error;

/// aggregator error type
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Malformed schedule expression
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        /// The rejected expression
        expression: String,
        /// Parser message
        reason: String,
    },

    /// Endpoint not found
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AggregatorError {
    /// Returns a machine readable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Common(CommonError::Validation(_)) => "VALIDATION_ERROR",
            Self::Common(_) => "INVALID_REQUEST",
            Self::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            Self::EndpointNotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSchedule { .. } => StatusCode::BAD_REQUEST,
            Self::EndpointNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for errors that are rejected at creation time.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchedule { .. } | Self::Common(CommonError::Validation(_))
        )
    }
}

/// aggregator result alias
pub type AggregatorResult<T> = Result<T, AggregatorError>;
