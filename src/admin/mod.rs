//! Admin HTTP Surface
//!
//! `/admin` 配下の JSON API とライブストリーム。エラーは常に
//! `{"error": "...", "code": "..."}` の構造化ボディで返す。

mod chaos;
mod drift;
mod endpoints;
mod health;
mod stream;
mod system;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Error;

/// 管理 API のルーター
pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/endpoints", get(endpoints::list))
        .route("/endpoints/manual", post(endpoints::create_manual))
        .route("/endpoints/:id", get(endpoints::detail))
        .route("/mode", get(system::get_mode).post(system::set_mode))
        .route("/learning", post(system::set_learning))
        .route("/logs", get(system::recent_logs))
        .route("/chaos", get(chaos::get_settings).post(chaos::update))
        .route("/drift-alerts", get(drift::list))
        .route("/drift-alerts/:id/resolve", post(drift::resolve))
        .route("/health", get(health::all))
        .route("/health/global", get(health::global))
        .route("/health/:id", get(health::endpoint))
        .route("/stream", get(stream::ws))
}

/// 管理 API のエラー応答
#[derive(Debug)]
pub struct AdminError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AdminError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_input",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<Error> for AdminError {
    fn from(err: Error) -> Self {
        Self {
            status: StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.code,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_from_crate_error() {
        let err = AdminError::from(Error::InvalidInput("bad".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_input");
    }

    #[test]
    fn test_not_found_helper() {
        let err = AdminError::not_found("no such endpoint");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
