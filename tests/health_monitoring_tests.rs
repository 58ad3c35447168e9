//! ヘルスモニタリングの統合テスト
//!
//! 安定したエンドポイントのスパイク検知と、元々ジッタが大きい
//! エンドポイントの適応的な許容を確認する。

use amp_rs::behavior::LatencyStats;
use amp_rs::health::{global_score, HealthMonitor, HealthSample, HealthWindow};
use chrono::Utc;

fn sample(latency: f64, status: u16, size: usize) -> HealthSample {
    HealthSample {
        latency_ms: latency,
        status,
        body_size_bytes: size,
        timestamp: Utc::now(),
    }
}

struct Endpoint {
    window: HealthWindow,
    baseline: LatencyStats,
    error_rate: f64,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            window: HealthWindow::default(),
            baseline: LatencyStats::default(),
            error_rate: 0.0,
        }
    }

    /// 統合ワーカーと同じ順序: 評価 → EMA 更新
    fn observe(
        &mut self,
        monitor: &HealthMonitor,
        latency: f64,
        status: u16,
    ) -> amp_rs::health::HealthAssessment {
        let assessment = monitor.evaluate(
            &mut self.window,
            sample(latency, status, 512),
            &self.baseline,
            self.error_rate,
            false,
        );
        self.baseline.observe(latency);
        let is_error = if status >= 500 { 1.0 } else { 0.0 };
        self.error_rate = 0.9 * self.error_rate + 0.1 * is_error;
        assessment
    }
}

#[test]
fn test_stable_endpoint_spike_flagged() {
    // シナリオ: /search が 100ms ± 20ms で 9 回、その後 2000ms
    let monitor = HealthMonitor::new();
    let mut endpoint = Endpoint::new();

    let jitters = [-20.0, 15.0, -10.0, 20.0, -15.0, 10.0, -5.0, 5.0, 0.0];
    for jitter in jitters {
        let assessment = endpoint.observe(&monitor, 100.0 + jitter, 200);
        assert!(!assessment.latency_anomaly);
    }

    let assessment = endpoint.observe(&monitor, 2000.0, 200);
    assert!(assessment.latency_anomaly);
    assert!(assessment.score < 80.0);
}

#[test]
fn test_jittery_endpoint_not_flagged() {
    // シナリオ: /llm が 200–3000ms で 50 回ばらつく → 3500ms は正常扱い
    let monitor = HealthMonitor::new();
    let mut endpoint = Endpoint::new();

    for i in 0..50u64 {
        let latency = 200.0 + ((i * 1237) % 2800) as f64;
        endpoint.observe(&monitor, latency, 200);
    }

    let assessment = endpoint.observe(&monitor, 3500.0, 200);
    assert!(!assessment.latency_anomaly);
}

#[test]
fn test_error_burst_degrades_health() {
    let monitor = HealthMonitor::new();
    let mut endpoint = Endpoint::new();

    for _ in 0..20 {
        endpoint.observe(&monitor, 50.0, 200);
    }

    let mut last = None;
    for _ in 0..3 {
        last = Some(endpoint.observe(&monitor, 50.0, 503));
    }

    let assessment = last.unwrap();
    assert!(assessment.error_spike);
    assert!(assessment.score < 80.0);
}

#[test]
fn test_scores_always_bounded() {
    let monitor = HealthMonitor::new();
    let mut endpoint = Endpoint::new();

    let mut scores = Vec::new();
    for i in 0..200u64 {
        let latency = if i % 17 == 0 { 50_000.0 } else { 40.0 };
        let status = if i % 13 == 0 { 503 } else { 200 };
        let assessment = endpoint.observe(&monitor, latency, status);
        scores.push(assessment.score);
        assert!(assessment.score >= 0.0 && assessment.score <= 100.0);
    }

    let global = global_score(&scores);
    assert!(global >= 0.0 && global <= 100.0);
}

#[test]
fn test_global_score_blend() {
    assert_eq!(global_score(&[]), 100.0);
    // 0.7·mean + 0.3·min
    let blended = global_score(&[90.0, 60.0]);
    assert!((blended - (0.7 * 75.0 + 0.3 * 60.0)).abs() < 1e-9);
}
