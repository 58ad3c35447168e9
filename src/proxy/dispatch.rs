//! Per-request dispatch
//!
//! キャッチオールハンドラ。正規化 → モード決定 → 転送 or 合成 → 記録。
//! 転送成功時はトランザクションを学習バッファへ渡し、障害時は
//! フェイルオーバーで合成レスポンスに切り替える。
//!
//! 状態遷移:
//! ```text
//! receive → normalize → load → decide
//!   mock:  synthesize → delay → respond
//!   proxy: apply_chaos → forward → (ok) record → respond
//!                                → (err) failover ? synthesize → respond : 502
//! ```

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::behavior::EndpointKey;
use crate::buffer::Transaction;
use crate::config::Mode;
use crate::engine::Engine;

/// 読み込むリクエストボディの上限
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// モック遅延の下限
const MIN_MOCK_DELAY_MS: f64 = 10.0;

/// キャッチオールのエントリポイント
pub async fn handle(State(engine): State<Arc<Engine>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let headers = req.headers().clone();

    let pattern = engine.normalizer.normalize(&path);

    // 名前付きハンドラに一致しなかった /admin/* は学習させず 404
    if pattern.starts_with("/admin") {
        return admin_not_found();
    }

    let body = match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "request body too large or unreadable",
                "bad_request",
            )
        }
    };
    let request_json = parse_json_body(&headers, &body);

    let key = EndpointKey::new(method.as_str(), pattern.clone());
    let flags = engine.flags();

    // モード決定: ヘッダ上書き > グローバル状態
    let mock_mode = match header_str(&headers, "x-mock-enabled") {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => flags.mode == Mode::Mock,
    };

    if mock_mode {
        return mock_response(&engine, &key, request_json.as_ref(), false).await;
    }

    let Some(forwarder) = engine.forwarder.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no TARGET_URL configured; set one or switch to mock mode",
            "no_target",
        );
    };

    // 障害注入
    let profile = engine.chaos.profile_for(&key);
    let mut simulate_failure = false;
    if !profile.is_noop() {
        let extra = profile.clamped_latency_ms();
        if extra > 0 {
            tokio::time::sleep(Duration::from_millis(extra)).await;
        }
        if let Some(forced) = profile.forced_status_code {
            return chaos_forced_response(&engine, &key, forced, extra).await;
        }
        if profile.failure_probability > 0.0 {
            simulate_failure = rand::thread_rng().gen::<f64>() < profile.failure_probability;
        }
    }

    let started = Instant::now();

    if simulate_failure {
        debug!("💥 Chaos-injected failure for {}", key);
        return failover_or_502(
            &engine,
            &key,
            request_json.as_ref(),
            &headers,
            started.elapsed().as_secs_f64() * 1000.0,
            flags.failover,
            "chaos-injected failure",
        )
        .await;
    }

    match forwarder
        .forward(&method, &path_and_query, &headers, body)
        .await
    {
        Ok(upstream) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let response_json = parse_json_body(&upstream.headers, &upstream.body);

            if flags.learning_enabled {
                engine.buffer.push(Transaction {
                    method: method.as_str().to_string(),
                    path,
                    pattern,
                    status: upstream.status,
                    latency_ms,
                    request_headers: header_map(&headers),
                    request_body: request_json,
                    response_headers: header_map(&upstream.headers),
                    response_body: response_json,
                    response_size: upstream.body.len(),
                    timestamp: Utc::now(),
                    mocked: false,
                    chaos: false,
                    failover: false,
                });
            }

            passthrough_response(upstream.status, &upstream.headers, upstream.body)
        }
        Err(err) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            warn!(
                "⚠️ PROXY FAILOVER: upstream {} unreachable for {}: {}",
                forwarder.base_url(),
                key,
                err
            );
            failover_or_502(
                &engine,
                &key,
                request_json.as_ref(),
                &headers,
                latency_ms,
                flags.failover,
                "upstream unreachable",
            )
            .await
        }
    }
}

/// 転送障害時の分岐: フェイルオーバー有効なら合成、無効なら 502
async fn failover_or_502(
    engine: &Arc<Engine>,
    key: &EndpointKey,
    request_json: Option<&Value>,
    headers: &HeaderMap,
    latency_ms: f64,
    failover: bool,
    reason: &str,
) -> Response {
    // 失敗そのものは観測として記録する (502 がヒストグラムに乗る)
    if engine.flags().learning_enabled {
        engine.buffer.push(Transaction {
            method: key.method.clone(),
            path: key.pattern.clone(),
            pattern: key.pattern.clone(),
            status: 502,
            latency_ms,
            request_headers: header_map(headers),
            request_body: request_json.cloned(),
            response_headers: HashMap::new(),
            response_body: None,
            response_size: 0,
            timestamp: Utc::now(),
            mocked: true,
            chaos: false,
            failover: true,
        });
    }

    if failover {
        mock_response(engine, key, request_json, true).await
    } else {
        error_response(
            StatusCode::BAD_GATEWAY,
            &format!("upstream request failed: {}", reason),
            "upstream_failed",
        )
    }
}

/// 学習済みの挙動からモックレスポンスを合成する
async fn mock_response(
    engine: &Arc<Engine>,
    key: &EndpointKey,
    request_json: Option<&Value>,
    is_failover: bool,
) -> Response {
    let entry = engine.store.get(key).await;

    let Some(entry) = entry else {
        // 未学習エンドポイント: 空のボディで応答し、コールドモックを数える
        engine.counters.cold_mocks.fetch_add(1, Ordering::Relaxed);
        debug!("🧊 Cold mock for unknown endpoint {}", key);
        record_mock(engine, key, 200, 0.0, is_failover);
        return mock_json_response(StatusCode::OK, json!({}), is_failover);
    };

    // ロックの下でサンプリングに必要な値だけ取り出す
    let (schema, status, delay_ms) = {
        let guard = entry.lock().await;
        let status = if is_failover {
            200
        } else {
            sample_status(&guard.record.status_histogram)
        };
        let class = status / 100;
        let schema = guard
            .record
            .response_schemas
            .get(&class)
            .or_else(|| guard.record.primary_response_schema())
            .cloned();
        let delay = sample_latency(guard.record.latency.mean, guard.record.latency.std_dev());
        (schema, status, delay)
    };

    // フェイルオーバーはタイムアウト分をすでに待っているので遅延させない
    if !is_failover && delay_ms > 0.0 {
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
    }

    let body = match schema {
        Some(schema) => engine.generator.generate(&schema, request_json),
        None => json!({}),
    };

    record_mock(engine, key, status, delay_ms, is_failover);

    let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    mock_json_response(status_code, body, is_failover)
}

/// モック応答のトランザクションを記録する
fn record_mock(engine: &Arc<Engine>, key: &EndpointKey, status: u16, latency_ms: f64, failover: bool) {
    // フェイルオーバーは failover_or_502 側で 502 として記録済み
    if failover || !engine.flags().learning_enabled {
        return;
    }
    engine.buffer.push(Transaction {
        method: key.method.clone(),
        path: key.pattern.clone(),
        pattern: key.pattern.clone(),
        status,
        latency_ms,
        request_headers: HashMap::new(),
        request_body: None,
        response_headers: HashMap::new(),
        response_body: None,
        response_size: 0,
        timestamp: Utc::now(),
        mocked: true,
        chaos: false,
        failover: false,
    });
}

/// 障害注入の固定ステータス応答
async fn chaos_forced_response(
    engine: &Arc<Engine>,
    key: &EndpointKey,
    forced: u16,
    injected_latency_ms: u64,
) -> Response {
    if engine.flags().learning_enabled {
        engine.buffer.push(Transaction {
            method: key.method.clone(),
            path: key.pattern.clone(),
            pattern: key.pattern.clone(),
            status: forced,
            latency_ms: injected_latency_ms as f64,
            request_headers: HashMap::new(),
            request_body: None,
            response_headers: HashMap::new(),
            response_body: None,
            response_size: 0,
            timestamp: Utc::now(),
            mocked: false,
            chaos: true,
            failover: false,
        });
    }

    let status = StatusCode::from_u16(forced).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [("x-amp-chaos", "forced-status")],
        Json(json!({
            "error": "chaos-injected status",
            "status": forced,
        })),
    )
        .into_response()
}

/// 学習済みヒストグラムからステータスを重み付きサンプリング
fn sample_status(histogram: &crate::behavior::StatusHistogram) -> u16 {
    if histogram.is_empty() {
        return 200;
    }
    let total = histogram.total();
    let mut pick = rand::thread_rng().gen_range(0..total);
    for (code, count) in &histogram.codes {
        if pick < *count {
            return *code;
        }
        pick -= count;
    }
    200
}

/// 学習済み EMA から遅延をサンプリング (下限 10ms)
fn sample_latency(mean: f64, std: f64) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    let sampled = match Normal::new(mean, std.max(1.0)) {
        Ok(dist) => dist.sample(&mut rand::thread_rng()),
        Err(_) => mean,
    };
    sampled.max(MIN_MOCK_DELAY_MS)
}

fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Option<Value> {
    if body.is_empty() || !is_json_content(headers) {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// `Content-Type: application/json*` のときだけ学習対象として解析する
fn is_json_content(headers: &HeaderMap) -> bool {
    header_str(headers, "content-type")
        .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// アップストリーム応答の素通し
fn passthrough_response(status: u16, headers: &HeaderMap, body: Bytes) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));

    for (name, value) in headers {
        let lowered = name.as_str().to_ascii_lowercase();
        if matches!(
            lowered.as_str(),
            "connection" | "transfer-encoding" | "content-length" | "keep-alive"
        ) {
            continue;
        }
        builder = builder.header(name.clone(), value.clone());
    }

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn mock_json_response(status: StatusCode, body: Value, is_failover: bool) -> Response {
    let marker = if is_failover { "failover" } else { "mock" };
    (status, [("x-amp-mocked", marker)], Json(body)).into_response()
}

fn error_response(status: StatusCode, message: &str, code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": message,
            "code": code,
        })),
    )
        .into_response()
}

fn admin_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found", "not_found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::StatusHistogram;

    #[test]
    fn test_sample_status_empty_histogram() {
        assert_eq!(sample_status(&StatusHistogram::default()), 200);
    }

    #[test]
    fn test_sample_status_single_code() {
        let mut histogram = StatusHistogram::default();
        histogram.record(404);
        histogram.record(404);
        assert_eq!(sample_status(&histogram), 404);
    }

    #[test]
    fn test_sample_latency_floor() {
        let sampled = sample_latency(50.0, 5.0);
        assert!(sampled >= MIN_MOCK_DELAY_MS);
        assert_eq!(sample_latency(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_is_json_content() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        assert!(is_json_content(&headers));

        headers.insert(
            "content-type",
            "application/json; charset=utf-8".parse().unwrap(),
        );
        assert!(is_json_content(&headers));

        headers.insert("content-type", "text/html".parse().unwrap());
        assert!(!is_json_content(&headers));
    }

    #[test]
    fn test_header_map_conversion() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", "value".parse().unwrap());
        let map = header_map(&headers);
        assert_eq!(map.get("x-test").map(String::as_str), Some("value"));
    }
}
