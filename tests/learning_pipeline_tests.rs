//! 学習パイプラインの統合テスト
//!
//! バッファ → 統合ワーカー → 挙動ストア → ブロードキャストの流れを
//! エンジン全体で検証する。ブロードキャストはストア更新後に発行される
//! ため、イベント受信を同期ポイントとして使える。

use amp_rs::behavior::EndpointKey;
use amp_rs::buffer::Transaction;
use amp_rs::config::{AmpConfig, Mode};
use amp_rs::engine::Engine;
use amp_rs::storage::{EngineStorage, MemoryStorage};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn mock_config() -> AmpConfig {
    AmpConfig {
        mode: Mode::Mock,
        ..Default::default()
    }
}

fn proxied(path: &str, pattern: &str, status: u16, latency: f64, body: Option<Value>) -> Transaction {
    Transaction {
        method: "GET".to_string(),
        path: path.to_string(),
        pattern: pattern.to_string(),
        status,
        latency_ms: latency,
        request_headers: HashMap::new(),
        request_body: None,
        response_headers: HashMap::new(),
        response_body: body,
        response_size: 128,
        timestamp: Utc::now(),
        mocked: false,
        chaos: false,
        failover: false,
    }
}

async fn recv_event(
    rx: &mut tokio::sync::broadcast::Receiver<amp_rs::broadcast::TransactionEvent>,
) -> amp_rs::broadcast::TransactionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for broadcast event")
        .expect("broadcast channel closed")
}

#[tokio::test]
async fn test_same_pattern_consolidates_into_one_endpoint() {
    // シナリオ: GET /users/42 と GET /users/99 は 1 エンドポイントに集約される
    let engine = Engine::bootstrap(mock_config(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    let body = json!({"id": 42, "name": "x"});
    engine
        .buffer
        .push(proxied("/users/42", "/users/{id}", 200, 35.0, Some(body.clone())));
    engine
        .buffer
        .push(proxied("/users/99", "/users/{id}", 200, 40.0, Some(body)));

    recv_event(&mut events).await;
    let event = recv_event(&mut events).await;
    assert_eq!(event.endpoint, "/users/{id}");
    assert!(!event.mocked);

    let key = EndpointKey::new("GET", "/users/{id}");
    let entry = engine.store.get(&key).await.expect("endpoint learned");
    {
        let guard = entry.lock().await;
        assert_eq!(guard.record.sample_count, 2);
        assert!(guard.record.latency.mean > 0.0);
        assert!(guard.record.response_schemas.contains_key(&2));
    }
    assert_eq!(engine.store.len().await, 1);

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_endpoint_persisted_eagerly() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::bootstrap(mock_config(), storage.clone())
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    engine
        .buffer
        .push(proxied("/items", "/items", 200, 10.0, Some(json!({"a": 1}))));
    recv_event(&mut events).await;

    let state = storage.load().await.unwrap();
    assert_eq!(state.endpoints.len(), 1);
    assert_eq!(state.endpoints[0].pattern, "/items");

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_drift_alert_created_after_stable_schema() {
    // シナリオ: {"a":1,"b":2} を 10 回 → {"a":1} でドリフト警告
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::bootstrap(mock_config(), storage.clone())
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    for _ in 0..10 {
        engine.buffer.push(proxied(
            "/items",
            "/items",
            200,
            20.0,
            Some(json!({"a": 1, "b": 2})),
        ));
    }
    for _ in 0..10 {
        recv_event(&mut events).await;
    }

    engine
        .buffer
        .push(proxied("/items", "/items", 200, 20.0, Some(json!({"a": 1}))));
    recv_event(&mut events).await;

    let alerts = storage.list_drift_alerts(true).await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert!(alert.score >= 40.0);
    assert_eq!(alert.issues.len(), 1);
    assert_eq!(alert.issues[0].path, "b");
    assert!(!alert.resolved);

    // エンドポイントの active_drift フラグも立つ
    let key = EndpointKey::new("GET", "/items");
    let entry = engine.store.get(&key).await.unwrap();
    assert!(entry.lock().await.active_drift);

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_drift_alert_deduplicated_per_endpoint() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::bootstrap(mock_config(), storage.clone())
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    for _ in 0..5 {
        engine.buffer.push(proxied(
            "/items",
            "/items",
            200,
            20.0,
            Some(json!({"a": 1, "b": 2})),
        ));
    }
    // 2 回連続でドリフトする観測
    engine
        .buffer
        .push(proxied("/items", "/items", 200, 20.0, Some(json!({"a": 1}))));
    engine
        .buffer
        .push(proxied("/items", "/items", 200, 20.0, Some(json!({"a": 1}))));
    for _ in 0..7 {
        recv_event(&mut events).await;
    }

    // 未解決警告は 1 件に集約される
    let alerts = storage.list_drift_alerts(true).await.unwrap();
    assert_eq!(alerts.len(), 1);

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_chaos_transactions_skip_schema_learning() {
    let engine = Engine::bootstrap(mock_config(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    let mut txn = proxied("/x", "/x", 503, 30.0, Some(json!({"should": "not-learn"})));
    txn.chaos = true;
    engine.buffer.push(txn);
    let event = recv_event(&mut events).await;
    assert!(event.chaos);

    let key = EndpointKey::new("GET", "/x");
    let entry = engine.store.get(&key).await.unwrap();
    {
        let guard = entry.lock().await;
        // レイテンシ/ステータスは学習され、スキーマは学習されない
        assert_eq!(guard.record.sample_count, 1);
        assert_eq!(guard.record.status_histogram.codes.get(&503), Some(&1));
        assert!(guard.record.response_schemas.is_empty());
    }

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_failover_recorded_with_upstream_failure() {
    // フェイルオーバー: クライアントは 200 モックを受けるが、観測は 502 を記録する
    let engine = Engine::bootstrap(mock_config(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    let mut txn = proxied("/users/7", "/users/{id}", 502, 10000.0, None);
    txn.mocked = true;
    txn.failover = true;
    engine.buffer.push(txn);

    let event = recv_event(&mut events).await;
    assert!(event.mocked);
    assert_eq!(event.status, 502);

    let key = EndpointKey::new("GET", "/users/{id}");
    let entry = engine.store.get(&key).await.unwrap();
    {
        let guard = entry.lock().await;
        assert_eq!(guard.record.status_histogram.codes.get(&502), Some(&1));
        assert!(guard.record.error_rate > 0.0);
    }

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_pure_mock_transactions_do_not_pollute_stats() {
    let engine = Engine::bootstrap(mock_config(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    let mut txn = proxied("/cached", "/cached", 200, 55.0, None);
    txn.mocked = true;
    engine.buffer.push(txn);
    let event = recv_event(&mut events).await;
    assert!(event.mocked);

    let key = EndpointKey::new("GET", "/cached");
    let entry = engine.store.get(&key).await.unwrap();
    {
        let guard = entry.lock().await;
        assert_eq!(guard.record.sample_count, 0);
        assert!(guard.record.status_histogram.is_empty());
    }

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_recent_logs_ring() {
    let engine = Engine::bootstrap(mock_config(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();
    let mut events = engine.broadcaster.subscribe();

    for i in 0..3 {
        engine.buffer.push(proxied(
            "/logged",
            "/logged",
            200,
            10.0 + i as f64,
            None,
        ));
    }
    for _ in 0..3 {
        recv_event(&mut events).await;
    }

    let logs = engine.recent_logs().await;
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].pattern, "/logged");
    assert_eq!(logs[0].kind, "proxy");

    engine.shutdown(worker, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_shutdown_drains_buffer() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::bootstrap(mock_config(), storage.clone())
        .await
        .unwrap();
    let worker = engine.spawn_consolidator();

    for i in 0..20 {
        engine
            .buffer
            .push(proxied(&format!("/bulk/{}", i), "/bulk/{id}", 200, 5.0, None));
    }

    engine.shutdown(worker, Duration::from_secs(5)).await;

    // 猶予内に全トランザクションが統合されている
    assert!(engine.buffer.is_empty());
    let state = storage.load().await.unwrap();
    assert_eq!(state.endpoints.len(), 1);
    assert_eq!(state.endpoints[0].sample_count, 20);
}
