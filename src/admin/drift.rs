//! ドリフト警告の一覧と解決

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::AdminError;
use crate::drift::DriftAlert;
use crate::engine::Engine;

#[derive(Debug, Deserialize)]
pub struct DriftQuery {
    #[serde(default)]
    pub unresolved_only: bool,
}

/// GET /admin/drift-alerts?unresolved_only=bool
pub async fn list(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<DriftQuery>,
) -> Result<Json<Vec<DriftAlert>>, AdminError> {
    let alerts = engine
        .storage
        .list_drift_alerts(query.unresolved_only)
        .await
        .map_err(AdminError::from)?;
    Ok(Json(alerts))
}

/// POST /admin/drift-alerts/{id}/resolve
pub async fn resolve(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AdminError> {
    let resolved = engine
        .storage
        .resolve_drift_alert(id)
        .await
        .map_err(AdminError::from)?
        .ok_or_else(|| AdminError::not_found(format!("drift alert {} not found", id)))?;

    // パーティションの active_drift フラグを同期する
    if let Some(entry) = engine.store.find_by_id(resolved.endpoint_id).await {
        let remaining = engine
            .storage
            .unresolved_for_endpoint(resolved.endpoint_id)
            .await
            .map_err(AdminError::from)?;
        if remaining.is_empty() {
            entry.lock().await.active_drift = false;
        }
    }

    info!("✅ Drift alert {} resolved", id);
    Ok(Json(json!({ "status": "resolved", "id": id })))
}
