//! Contract Drift Detection
//!
//! 学習済みスキーマと新しいレスポンス形状の構造差分を検出し、
//! 深刻度スコアと平易な英語の説明文を付けて警告を生成する。

mod detector;
mod narrator;
mod types;

pub use detector::DriftDetector;
pub use types::{DriftAlert, DriftIssue, IssueKind, Severity};
