use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// ウィンドウの既定サンプル数
pub const WINDOW_SIZE: usize = 100;

/// 1 リクエスト分の観測
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub latency_ms: f64,
    pub status: u16,
    pub body_size_bytes: usize,
    pub timestamp: DateTime<Utc>,
}

impl HealthSample {
    pub fn is_error(&self) -> bool {
        self.status >= 500
    }
}

/// 直近 N サンプルのリングバッファ
///
/// メモリ上のみで保持され、再起動で失われてよい。
#[derive(Debug, Clone)]
pub struct HealthWindow {
    samples: VecDeque<HealthSample>,
    capacity: usize,
}

impl HealthWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: HealthSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// ウィンドウ内の 5xx 比率
    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let errors = self.samples.iter().filter(|s| s.is_error()).count();
        errors as f64 / self.samples.len() as f64
    }

    pub fn error_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_error()).count()
    }

    /// ウィンドウ内の平均レスポンスサイズ (サイズ 0 は除外)
    pub fn mean_body_size(&self) -> f64 {
        let sizes: Vec<usize> = self
            .samples
            .iter()
            .map(|s| s.body_size_bytes)
            .filter(|&s| s > 0)
            .collect();
        if sizes.is_empty() {
            return 0.0;
        }
        sizes.iter().sum::<usize>() as f64 / sizes.len() as f64
    }
}

impl Default for HealthWindow {
    fn default() -> Self {
        Self::new(WINDOW_SIZE)
    }
}

/// ヘルスステータス帯
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Healthy,
    Degraded,
    Critical,
}

impl HealthBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthBand::Healthy
        } else if score >= 50.0 {
            HealthBand::Degraded
        } else {
            HealthBand::Critical
        }
    }
}

/// 異常の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LatencySpike,
    ErrorSpike,
    SizeDrift,
    ActiveDrift,
}

/// 異常の深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Medium,
    High,
}

/// 検知された異常
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: AnomalySeverity,
    pub message: String,
}

/// 1 観測に対するヘルス評価
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub score: f64,
    pub band: HealthBand,
    pub anomalies: Vec<Anomaly>,
    pub latency_anomaly: bool,
    pub error_spike: bool,
    pub size_anomaly: bool,
    pub has_drift: bool,
    pub observations: usize,
    pub evaluated_at: DateTime<Utc>,
}

impl HealthAssessment {
    /// 観測のない（あるいは学習中の）エンドポイントの既定評価
    pub fn baseline() -> Self {
        Self {
            score: 100.0,
            band: HealthBand::Healthy,
            anomalies: Vec::new(),
            latency_anomaly: false,
            error_spike: false,
            size_anomaly: false,
            has_drift: false,
            observations: 0,
            evaluated_at: Utc::now(),
        }
    }
}
