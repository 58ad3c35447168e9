//! Consolidator
//!
//! 学習バッファを直列に消化する唯一のバックグラウンドワーカー。
//! 挙動ストアの更新 → 永続化 → ブロードキャストの順で処理し、
//! エンドポイント単位の更新順序は到着順と一致する。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::behavior::{truncate_example, EndpointKey, EndpointRecord};
use crate::broadcast::TransactionEvent;
use crate::buffer::Transaction;
use crate::drift::{DriftAlert, DriftDetector};
use crate::engine::{Engine, LogEntry};
use crate::error::Result;
use crate::health::HealthSample;
use crate::schema::SchemaDescriptor;

/// 永続化リトライまでの待ち時間
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// ワーカー本体。シャットダウン通知後は残りを吐き切って終了する。
pub async fn run(engine: Arc<Engine>) {
    let mut shutdown = engine.shutdown_rx();
    info!("🔁 Consolidator started");

    while let Some(txn) = engine.buffer.pop(&mut shutdown).await {
        if let Err(e) = consolidate(&engine, txn).await {
            warn!("Failed to consolidate transaction: {}", e);
        }
    }

    info!("🔁 Consolidator drained and stopped");
}

/// 1 トランザクションの統合処理
async fn consolidate(engine: &Arc<Engine>, txn: Transaction) -> Result<()> {
    let key = EndpointKey::new(txn.method.clone(), txn.pattern.clone());
    let (entry, created) = engine.store.entry(&key).await;
    if created {
        debug!("New endpoint learned: {}", key);
    }

    let mut new_alert: Option<DriftAlert> = None;

    // パーティションロックの下で統計・スキーマ・ウィンドウを更新する。
    // ロック中に await しない。
    let (record_snapshot, health_score, drift_detected) = {
        let mut guard = entry.lock().await;
        let state = &mut *guard;
        state.record.last_seen = txn.timestamp;

        let mut health_score = state.assessment.as_ref().map(|a| a.score).unwrap_or(100.0);
        let mut drift_detected = false;

        let learns_stats = !txn.mocked || txn.failover;

        if learns_stats {
            // ヘルス評価は EMA 更新前のベースラインに対して行う
            let sample = HealthSample {
                latency_ms: txn.latency_ms,
                status: txn.status,
                body_size_bytes: txn.response_size,
                timestamp: txn.timestamp,
            };
            let assessment = engine.monitor.evaluate(
                &mut state.window,
                sample,
                &state.record.latency,
                state.record.error_rate,
                state.active_drift,
            );
            for anomaly in &assessment.anomalies {
                warn!("🩺 HEALTH ANOMALY [{}]: {}", key, anomaly.message);
            }
            health_score = assessment.score;
            state.assessment = Some(assessment);

            state.record.sample_count += 1;
            state.record.latency.observe(txn.latency_ms);
            state.record.status_histogram.record(txn.status);
            state.record.observe_error(txn.status);
        }

        // スキーマ学習とドリフト検出は実トラフィックのみ
        if !txn.mocked && !txn.chaos {
            if let Some(req_body) = &txn.request_body {
                let fresh = SchemaDescriptor::infer(req_body);
                state.record.request_schema = Some(match state.record.request_schema.take() {
                    Some(existing) => SchemaDescriptor::merge(existing, fresh),
                    None => fresh,
                });
                state.record.last_request_example = Some(truncate_example(req_body));
            }

            if let Some(resp_body) = &txn.response_body {
                let fresh = SchemaDescriptor::infer(resp_body);
                let class = txn.status / 100;

                if let Some(stored) = state.record.response_schemas.get(&class) {
                    let issues = engine.detector.detect(stored, &fresh);
                    if !issues.is_empty() {
                        let score = DriftDetector::score(&issues);
                        let summary = DriftDetector::summarize(&issues);
                        new_alert = Some(DriftAlert::new(
                            state.record.id,
                            key.to_string(),
                            score,
                            summary,
                            issues,
                        ));
                        state.active_drift = true;
                        drift_detected = true;
                    }
                }

                let merged = match state.record.response_schemas.remove(&class) {
                    Some(existing) => SchemaDescriptor::merge(existing, fresh),
                    None => fresh,
                };
                state.record.response_schemas.insert(class, merged);
                state.record.last_response_example = Some(truncate_example(resp_body));
            }
        }

        (state.record.clone(), health_score, drift_detected)
    };

    persist_with_retry(engine, &record_snapshot).await;

    if let Some(alert) = new_alert {
        store_drift_alert(engine, alert).await;
    }

    engine
        .push_recent(LogEntry {
            timestamp: txn.timestamp,
            method: txn.method.clone(),
            pattern: txn.pattern.clone(),
            status: txn.status,
            latency_ms: txn.latency_ms.round() as u64,
            kind: if txn.chaos {
                "chaos".to_string()
            } else if txn.mocked {
                "mock".to_string()
            } else {
                "proxy".to_string()
            },
            drift: drift_detected,
            health_score,
        })
        .await;

    // ブロードキャストはストア更新のコミット後
    engine.broadcaster.publish(TransactionEvent {
        endpoint: txn.pattern,
        method: txn.method,
        status: txn.status,
        latency_ms: txn.latency_ms,
        mocked: txn.mocked,
        chaos: txn.chaos,
        health_score,
        timestamp: txn.timestamp,
    });

    Ok(())
}

/// 永続化 (一度だけバックオフ付きで再試行)
///
/// 二度目も失敗したら記録して続行する。メモリ上の状態は正しく、
/// 次の成功で回復する。
async fn persist_with_retry(engine: &Arc<Engine>, record: &EndpointRecord) {
    if let Err(first) = engine.storage.upsert_endpoint(record).await {
        warn!(
            "Storage write failed for {} {} (retrying): {}",
            record.method, record.pattern, first
        );
        tokio::time::sleep(RETRY_BACKOFF).await;
        if let Err(second) = engine.storage.upsert_endpoint(record).await {
            warn!(
                "Storage write failed again for {} {}; continuing with in-memory state: {}",
                record.method, record.pattern, second
            );
        }
    }
}

/// ドリフト警告の保存。未解決の既存警告があれば重複させず更新する。
async fn store_drift_alert(engine: &Arc<Engine>, mut alert: DriftAlert) {
    match engine.storage.unresolved_for_endpoint(alert.endpoint_id).await {
        Ok(existing) => {
            if let Some(current) = existing.first() {
                alert.id = current.id;
                info!(
                    "🔄 Updated drift alert for {} (score {:.0})",
                    alert.endpoint, alert.score
                );
            } else {
                info!(
                    "🚨 CONTRACT DRIFT [{}]: {} (score {:.0})",
                    alert.endpoint, alert.summary, alert.score
                );
            }

            // 重複していた古い未解決警告は解決済みへ畳む
            for orphan in existing.iter().skip(1) {
                if let Err(e) = engine.storage.resolve_drift_alert(orphan.id).await {
                    warn!("Failed to clean up orphaned drift alert: {}", e);
                }
            }
        }
        Err(e) => warn!("Failed to query existing drift alerts: {}", e),
    }

    if let Err(e) = engine.storage.put_drift_alert(&alert).await {
        warn!("Failed to store drift alert for {}: {}", alert.endpoint, e);
    }
}
