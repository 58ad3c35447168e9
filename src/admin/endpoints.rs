//! エンドポイント管理: 一覧・詳細・手動定義

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::AdminError;
use crate::behavior::{EndpointKey, EndpointSummary};
use crate::engine::Engine;
use crate::schema::SchemaDescriptor;

/// GET /admin/endpoints
pub async fn list(State(engine): State<Arc<Engine>>) -> Json<Vec<EndpointSummary>> {
    Json(engine.store.summaries().await)
}

/// GET /admin/endpoints/{id}
pub async fn detail(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AdminError> {
    let entry = engine
        .store
        .find_by_id(id)
        .await
        .ok_or_else(|| AdminError::not_found(format!("endpoint {} not found", id)))?;

    let guard = entry.lock().await;
    let key = guard.record.key();
    let chaos = engine.chaos.profile_for(&key);

    Ok(Json(json!({
        "record": guard.record,
        "health": guard.assessment,
        "active_drift": guard.active_drift,
        "chaos": chaos,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ManualEndpoint {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub request_body: Option<Value>,
}

/// POST /admin/endpoints/manual
///
/// 実バックエンドがまだ無いエンドポイントをサンプルボディから定義する。
pub async fn create_manual(
    State(engine): State<Arc<Engine>>,
    Json(input): Json<ManualEndpoint>,
) -> Result<Json<Value>, AdminError> {
    let path = input.path.trim();
    if path.is_empty() {
        return Err(AdminError::bad_request("path is required"));
    }
    let method = input.method.trim().to_ascii_uppercase();
    if method.is_empty() {
        return Err(AdminError::bad_request("method is required"));
    }
    let status = input.status_code.unwrap_or(200);
    if !(100..=599).contains(&status) {
        return Err(AdminError::bad_request(format!(
            "status_code {} is not a valid HTTP status",
            status
        )));
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let pattern = engine.normalizer.normalize(&path);
    let key = EndpointKey::new(method.clone(), pattern.clone());

    let (entry, created) = engine.store.entry(&key).await;
    let record = {
        let mut guard = entry.lock().await;

        if let Some(body) = &input.response_body {
            let fresh = SchemaDescriptor::infer(body);
            let class = status / 100;
            let merged = match guard.record.response_schemas.remove(&class) {
                Some(existing) => SchemaDescriptor::merge(existing, fresh),
                None => fresh,
            };
            guard.record.response_schemas.insert(class, merged);
            guard.record.status_histogram.record(status);
        }
        if let Some(body) = &input.request_body {
            let fresh = SchemaDescriptor::infer(body);
            guard.record.request_schema = Some(match guard.record.request_schema.take() {
                Some(existing) => SchemaDescriptor::merge(existing, fresh),
                None => fresh,
            });
        }

        guard.record.clone()
    };

    engine
        .storage
        .upsert_endpoint(&record)
        .await
        .map_err(AdminError::from)?;

    Ok(Json(json!({
        "status": if created { "created" } else { "updated" },
        "id": record.id,
        "method": method,
        "pattern": pattern,
    })))
}
