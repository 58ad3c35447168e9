//! 障害注入プロファイルの読み書き

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AdminError;
use crate::behavior::EndpointKey;
use crate::chaos::{preset_names, ChaosProfile};
use crate::engine::Engine;

/// GET /admin/chaos
pub async fn get_settings(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let settings = engine.chaos.current();
    Json(json!({
        "global": settings.global,
        "per_endpoint": settings.per_endpoint,
        "presets": preset_names(),
    }))
}

/// POST /admin/chaos の受理形式
///
/// - `{"preset": "friday_afternoon"}` — 名前付きプリセットをグローバル適用
/// - `{"profile": {...}}` — グローバルプロファイルの直接設定
/// - `{"endpoint": {"method": "GET", "pattern": "/x"}, "profile": {...}}`
///   — エンドポイント別の上書き
#[derive(Debug, Deserialize)]
pub struct ChaosInput {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub profile: Option<ChaosProfile>,
    #[serde(default)]
    pub endpoint: Option<EndpointKey>,
}

/// POST /admin/chaos
pub async fn update(
    State(engine): State<Arc<Engine>>,
    Json(input): Json<ChaosInput>,
) -> Result<Json<Value>, AdminError> {
    if let Some(preset) = &input.preset {
        if input.profile.is_some() || input.endpoint.is_some() {
            return Err(AdminError::bad_request(
                "preset cannot be combined with profile or endpoint",
            ));
        }
        engine.chaos.apply_preset(preset).map_err(AdminError::from)?;
        return Ok(Json(json!({ "applied": preset })));
    }

    let Some(profile) = input.profile else {
        return Err(AdminError::bad_request(
            "expected 'preset' or 'profile' in request body",
        ));
    };

    match input.endpoint {
        Some(key) => {
            engine
                .chaos
                .set_endpoint(&key, profile.clone())
                .map_err(AdminError::from)?;
            Ok(Json(json!({ "endpoint": key.to_string(), "profile": profile })))
        }
        None => {
            engine
                .chaos
                .set_global(profile.clone())
                .map_err(AdminError::from)?;
            Ok(Json(json!({ "global": profile })))
        }
    }
}
