//! Health Monitor
//!
//! エンドポイント毎のスライディングウィンドウと学習済みベースラインから
//! 挙動異常を検知し、0–100 のヘルススコアを算出する。

mod monitor;
mod types;

pub use monitor::{global_score, HealthMonitor};
pub use types::{
    Anomaly, AnomalyKind, AnomalySeverity, HealthAssessment, HealthBand, HealthSample,
    HealthWindow, WINDOW_SIZE,
};
