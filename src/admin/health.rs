//! ヘルスモニタリング API

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use super::AdminError;
use crate::engine::Engine;
use crate::health::{global_score, HealthBand};

/// GET /admin/health — グローバル + 全エンドポイント + バッファ統計
pub async fn all(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let snapshot = engine.store.health_snapshot().await;
    let scores: Vec<f64> = snapshot.iter().map(|(_, _, a)| a.score).collect();

    let endpoints: Vec<Value> = snapshot
        .iter()
        .map(|(key, id, assessment)| {
            json!({
                "endpoint_id": id,
                "method": key.method,
                "pattern": key.pattern,
                "health": assessment,
            })
        })
        .collect();

    Json(json!({
        "global": global_payload(&scores, &engine),
        "endpoints": endpoints,
        "learning_buffer": engine.buffer.stats(),
    }))
}

/// GET /admin/health/global
pub async fn global(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let snapshot = engine.store.health_snapshot().await;
    let scores: Vec<f64> = snapshot.iter().map(|(_, _, a)| a.score).collect();
    Json(global_payload(&scores, &engine))
}

/// GET /admin/health/{endpoint_id}
pub async fn endpoint(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AdminError> {
    let entry = engine
        .store
        .find_by_id(id)
        .await
        .ok_or_else(|| AdminError::not_found(format!("endpoint {} not found", id)))?;

    let guard = entry.lock().await;
    Ok(Json(json!({
        "endpoint_id": id,
        "method": guard.record.method,
        "pattern": guard.record.pattern,
        "health": guard.assessment,
        "active_drift": guard.active_drift,
        "baseline": {
            "latency_mean_ms": guard.record.latency.mean,
            "latency_std_ms": guard.record.latency.std_dev(),
            "error_rate": guard.record.error_rate,
            "samples": guard.record.latency.samples,
        },
    })))
}

fn global_payload(scores: &[f64], engine: &Arc<Engine>) -> Value {
    let score = global_score(scores);
    let critical = scores.iter().filter(|s| **s < 50.0).count();
    let degraded = scores
        .iter()
        .filter(|s| **s < 80.0 && **s >= 50.0)
        .count();

    json!({
        "score": score,
        "status": HealthBand::from_score(score),
        "endpoints_monitored": scores.len(),
        "degraded_endpoints": degraded,
        "critical_endpoints": critical,
        "dropped_transactions": engine.buffer.dropped_count(),
        "cold_mocks": engine.counters.cold_mocks.load(Ordering::Relaxed),
    })
}
