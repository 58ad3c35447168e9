use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ドリフト問題の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// 必須フィールドがレスポンスから消えた
    Missing,
    /// 新しいフィールドが現れた
    Added,
    /// 型またはフォーマットが変わった
    TypeChanged,
}

/// ドリフト問題の深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Breaking,
}

/// 単一のドリフト問題
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftIssue {
    /// ドット記法のフィールドパス (例 `data.items.price`)
    pub path: String,
    pub kind: IssueKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// 平易な英語での影響説明と推奨アクション
    pub narration: String,
}

/// ドリフト警告 (追記型、resolved フラグのみ可変)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub endpoint: String,
    pub detected_at: DateTime<Utc>,
    pub score: f64,
    pub summary: String,
    pub issues: Vec<DriftIssue>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DriftAlert {
    pub fn new(
        endpoint_id: Uuid,
        endpoint: String,
        score: f64,
        summary: String,
        issues: Vec<DriftIssue>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            endpoint,
            detected_at: Utc::now(),
            score,
            summary,
            issues,
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Breaking > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_alert_resolution() {
        let mut alert = DriftAlert::new(Uuid::new_v4(), "GET /x".into(), 40.0, "s".into(), vec![]);
        assert!(!alert.resolved);
        alert.resolve();
        assert!(alert.resolved);
        assert!(alert.resolved_at.is_some());
    }
}
