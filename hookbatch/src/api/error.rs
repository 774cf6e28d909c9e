//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::error::AggregatorError;
use axum::{response::IntoResponse, Json};
use serde::Serialize;

/// エラーレスポンス
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// エラーメッセージ
    pub error: String,
    /// エラーコード
    pub code: String,
}

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub AggregatorError);

impl From<AggregatorError> for AppError {
    fn from(err: AggregatorError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let payload = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.error_code().to_string(),
        };
        (status, Json(payload)).into_response()
    }
}
