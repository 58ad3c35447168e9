//! モード切替・学習トグル・直近ログ

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AdminError;
use crate::config::Mode;
use crate::engine::{Engine, LogEntry};

#[derive(Debug, Deserialize)]
pub struct ModeInput {
    pub mode: String,
}

/// GET /admin/mode
pub async fn get_mode(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let flags = engine.flags();
    Json(json!({
        "mode": flags.mode,
        "failover": flags.failover,
        "learning_enabled": flags.learning_enabled,
    }))
}

/// POST /admin/mode
pub async fn set_mode(
    State(engine): State<Arc<Engine>>,
    Json(input): Json<ModeInput>,
) -> Result<Json<Value>, AdminError> {
    let mode: Mode = input
        .mode
        .parse()
        .map_err(|e: String| AdminError::bad_request(e))?;

    if mode == Mode::Proxy && engine.forwarder.is_none() {
        return Err(AdminError::bad_request(
            "cannot switch to proxy mode without TARGET_URL",
        ));
    }

    engine.set_mode(mode);
    Ok(Json(json!({ "mode": mode })))
}

#[derive(Debug, Deserialize)]
pub struct LearningInput {
    pub enabled: bool,
}

/// POST /admin/learning
pub async fn set_learning(
    State(engine): State<Arc<Engine>>,
    Json(input): Json<LearningInput>,
) -> Json<Value> {
    engine.set_learning_enabled(input.enabled);
    Json(json!({ "learning_enabled": input.enabled }))
}

/// GET /admin/logs — 直近 50 トランザクション
pub async fn recent_logs(State(engine): State<Arc<Engine>>) -> Json<Vec<LogEntry>> {
    Json(engine.recent_logs().await)
}
