//! Adaptive Anomaly Evaluation
//!
//! 学習済みベースライン (EMA μ/σ) とウィンドウ統計から異常を判定する。
//! z 閾値は変動係数 (CV = σ/μ) で適応的にスケールし、元々ジッタの
//! 大きいエンドポイントの誤検知を抑える。

use chrono::Utc;

use super::types::{
    Anomaly, AnomalyKind, AnomalySeverity, HealthAssessment, HealthBand, HealthSample,
    HealthWindow,
};
use crate::behavior::LatencyStats;

/// 異常判定を有効にする最小観測数
const MIN_OBSERVATIONS: usize = 5;

/// エラー率スパイクの判定係数
const ERROR_SPIKE_FACTOR: f64 = 3.0;
const ERROR_SPIKE_SEVERE_FACTOR: f64 = 5.0;
/// ベースラインエラー率の下限 (ゼロ除算回避)
const ERROR_RATE_FLOOR: f64 = 0.01;

/// サイズドリフトの判定係数
const SIZE_DRIFT_FACTOR: f64 = 3.0;

// スコアペナルティ
const LATENCY_PENALTY: f64 = 15.0;
const LATENCY_PENALTY_SEVERE: f64 = 22.5;
const ERROR_PENALTY: f64 = 25.0;
const ERROR_PENALTY_SEVERE: f64 = 37.5;
const SIZE_PENALTY: f64 = 10.0;
const DRIFT_PENALTY: f64 = 20.0;

/// ヘルスモニター
pub struct HealthMonitor {
    min_observations: usize,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
        }
    }

    /// 1 観測を評価し、ウィンドウへ取り込む
    ///
    /// `baseline` は観測取り込み前の学習済み統計を渡すこと。
    /// 評価後に呼び出し側が EMA を更新する。
    pub fn evaluate(
        &self,
        window: &mut HealthWindow,
        sample: HealthSample,
        baseline: &LatencyStats,
        baseline_error_rate: f64,
        has_active_drift: bool,
    ) -> HealthAssessment {
        let mut anomalies = Vec::new();
        let mut latency_anomaly = false;
        let mut error_spike = false;
        let mut size_anomaly = false;
        let mut penalty = 0.0;

        let warmed_up =
            window.len() >= self.min_observations && baseline.samples as usize >= self.min_observations;

        // 1. レイテンシ異常 (適応 z 閾値)
        if warmed_up {
            let mean = baseline.mean;
            let std = baseline.std_dev();
            let z = (sample.latency_ms - mean) / std.max(1.0);
            let z_thr = adaptive_z_threshold(mean, std);

            if z > z_thr {
                latency_anomaly = true;
                let severe = std > 0.0 && (sample.latency_ms - mean) / std > 2.0 * z_thr;
                penalty += if severe {
                    LATENCY_PENALTY_SEVERE
                } else {
                    LATENCY_PENALTY
                };
                anomalies.push(Anomaly {
                    kind: AnomalyKind::LatencySpike,
                    severity: if severe {
                        AnomalySeverity::High
                    } else {
                        AnomalySeverity::Medium
                    },
                    message: format!(
                        "Latency {:.0}ms is {:.1}σ above the learned baseline of {:.0}ms ± {:.0}ms (threshold {:.1}σ)",
                        sample.latency_ms, z, mean, std, z_thr
                    ),
                });
            }
        }

        // 2. サイズドリフト (ウィンドウ平均に対して、現在の観測を除く)
        let mean_size = window.mean_body_size();
        if warmed_up && sample.body_size_bytes > 0 && mean_size > 0.0 {
            let deviation = (sample.body_size_bytes as f64 - mean_size).abs();
            if deviation > SIZE_DRIFT_FACTOR * mean_size {
                size_anomaly = true;
                penalty += SIZE_PENALTY;
                anomalies.push(Anomaly {
                    kind: AnomalyKind::SizeDrift,
                    severity: AnomalySeverity::Medium,
                    message: format!(
                        "Response size {}B deviates from the recent average of {:.0}B",
                        sample.body_size_bytes, mean_size
                    ),
                });
            }
        }

        // 観測をウィンドウへ取り込んでからエラー率を見る
        window.push(sample);

        // 3. エラー率スパイク (現在の観測を含むウィンドウ比率 vs EMA ベースライン)
        if window.len() >= self.min_observations {
            let window_rate = window.error_rate();
            let baseline_rate = baseline_error_rate.max(ERROR_RATE_FLOOR);
            let factor = window_rate / baseline_rate;

            if factor >= ERROR_SPIKE_FACTOR && window.error_count() >= 2 {
                error_spike = true;
                let severe = factor >= ERROR_SPIKE_SEVERE_FACTOR;
                penalty += if severe {
                    ERROR_PENALTY_SEVERE
                } else {
                    ERROR_PENALTY
                };
                anomalies.push(Anomaly {
                    kind: AnomalyKind::ErrorSpike,
                    severity: if severe {
                        AnomalySeverity::High
                    } else {
                        AnomalySeverity::Medium
                    },
                    message: format!(
                        "Error rate {:.0}% is {:.1}x the baseline of {:.1}%",
                        window_rate * 100.0,
                        factor,
                        baseline_error_rate * 100.0
                    ),
                });
            }
        }

        // 4. 未解決ドリフト
        if has_active_drift {
            penalty += DRIFT_PENALTY;
            anomalies.push(Anomaly {
                kind: AnomalyKind::ActiveDrift,
                severity: AnomalySeverity::Medium,
                message: "Unresolved contract drift is active for this endpoint".to_string(),
            });
        }

        let score = (100.0 - penalty).clamp(0.0, 100.0);

        HealthAssessment {
            score,
            band: HealthBand::from_score(score),
            anomalies,
            latency_anomaly,
            error_spike,
            size_anomaly,
            has_drift: has_active_drift,
            observations: window.len(),
            evaluated_at: Utc::now(),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// CV でスケールした z 閾値: clip(2 + 4·min(CV, 1), 2, 6)
fn adaptive_z_threshold(mean: f64, std: f64) -> f64 {
    let cv = std / mean.max(1.0);
    (2.0 + 4.0 * cv.min(1.0)).clamp(2.0, 6.0)
}

/// グローバルヘルススコア: 0.7·平均 + 0.3·最小 (エンドポイントなしで 100)
pub fn global_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 100.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    (0.7 * mean + 0.3 * min).clamp(0.0, 100.0)
}
