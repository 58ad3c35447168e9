use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::schema::SchemaDescriptor;

/// EMA の平滑化係数
pub const EMA_ALPHA: f64 = 0.1;

/// サンプルペイロードの保存上限 (64 KiB)
pub const EXAMPLE_LIMIT_BYTES: usize = 64 * 1024;

/// エンドポイント識別キー: (メソッド, パターンキー)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub method: String,
    pub pattern: String,
}

impl EndpointKey {
    pub fn new(method: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

/// レイテンシの EMA 統計 (平均と二乗平均)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean: f64,
    pub mean_sq: f64,
    pub samples: u64,
}

impl LatencyStats {
    /// 新しい観測を取り込む
    ///
    /// 初回は観測値そのものを初期値とし、ウォームアップの歪みを避ける。
    pub fn observe(&mut self, latency_ms: f64) {
        if self.samples == 0 {
            self.mean = latency_ms;
            self.mean_sq = latency_ms * latency_ms;
        } else {
            self.mean = (1.0 - EMA_ALPHA) * self.mean + EMA_ALPHA * latency_ms;
            self.mean_sq =
                (1.0 - EMA_ALPHA) * self.mean_sq + EMA_ALPHA * latency_ms * latency_ms;
        }
        self.samples += 1;
    }

    /// 標準偏差: √max(0, E[x²] − E[x]²)
    pub fn std_dev(&self) -> f64 {
        (self.mean_sq - self.mean * self.mean).max(0.0).sqrt()
    }
}

/// ステータスコードのヒストグラム (クラス別 + 正確なコード別)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusHistogram {
    pub classes: BTreeMap<u16, u64>,
    pub codes: BTreeMap<u16, u64>,
}

impl StatusHistogram {
    pub fn record(&mut self, status: u16) {
        *self.classes.entry(status / 100).or_insert(0) += 1;
        *self.codes.entry(status).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.codes.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// 学習済みエンドポイントの永続レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub id: Uuid,
    pub method: String,
    pub pattern: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sample_count: u64,

    pub latency: LatencyStats,
    /// 5xx 比率の EMA
    pub error_rate: f64,
    pub status_histogram: StatusHistogram,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<SchemaDescriptor>,
    /// ステータスクラス (2, 4, 5, ...) ごとのレスポンス記述子
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_schemas: BTreeMap<u16, SchemaDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_example: Option<Value>,
}

impl EndpointRecord {
    pub fn new(key: &EndpointKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            method: key.method.clone(),
            pattern: key.pattern.clone(),
            first_seen: now,
            last_seen: now,
            sample_count: 0,
            latency: LatencyStats::default(),
            error_rate: 0.0,
            status_histogram: StatusHistogram::default(),
            request_schema: None,
            response_schemas: BTreeMap::new(),
            last_request_example: None,
            last_response_example: None,
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.method.clone(), self.pattern.clone())
    }

    /// 5xx 比率の EMA を更新する
    pub fn observe_error(&mut self, status: u16) {
        let is_error = if status >= 500 { 1.0 } else { 0.0 };
        self.error_rate = (1.0 - EMA_ALPHA) * self.error_rate + EMA_ALPHA * is_error;
    }

    /// 学習済みレスポンス記述子 (成功クラス優先)
    pub fn primary_response_schema(&self) -> Option<&SchemaDescriptor> {
        self.response_schemas
            .get(&2)
            .or_else(|| self.response_schemas.values().next())
    }
}

/// 管理 API 向けのエンドポイント要約
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub id: Uuid,
    pub method: String,
    pub pattern: String,
    pub sample_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub latency_mean_ms: f64,
    pub latency_std_ms: f64,
    pub error_rate: f64,
    pub health_score: f64,
}

/// サンプルペイロードを上限に合わせて切り詰める
///
/// 上限を超える場合は内容の代わりにマーカーを格納する。
pub fn truncate_example(value: &Value) -> Value {
    let size = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0);
    if size <= EXAMPLE_LIMIT_BYTES {
        value.clone()
    } else {
        json!({
            "_truncated": true,
            "original_bytes": size,
        })
    }
}
