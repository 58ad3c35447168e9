//! Structural Drift Detector
//!
//! 保存済み記述子と新しいレスポンスの記述子を同時に辿り、
//! フィールド単位の差分を深刻度付きで列挙する。

use super::narrator::narrate;
use super::types::{DriftIssue, IssueKind, Severity};
use crate::schema::SchemaDescriptor;

/// 深刻度ごとのスコア重み
const BREAKING_WEIGHT: f64 = 40.0;
const WARNING_WEIGHT: f64 = 15.0;
const INFO_WEIGHT: f64 = 3.0;

/// 学習初期のノイズを避けるための最小観測数
const MIN_OBSERVATIONS: u64 = 3;

/// ドリフト検出器
pub struct DriftDetector {
    min_observations: u64,
}

impl DriftDetector {
    pub fn new() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
        }
    }

    /// 保存済み記述子 `stored` と新観測の記述子 `fresh` を比較する
    ///
    /// `stored` の観測数が閾値未満の間は空を返す。
    pub fn detect(
        &self,
        stored: &SchemaDescriptor,
        fresh: &SchemaDescriptor,
    ) -> Vec<DriftIssue> {
        if stored.count() < self.min_observations {
            return Vec::new();
        }
        let mut issues = Vec::new();
        walk(stored, fresh, "", &mut issues);
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    /// ドリフトスコア: min(100, 40·breaking + 15·warning + 3·info)
    pub fn score(issues: &[DriftIssue]) -> f64 {
        let total: f64 = issues
            .iter()
            .map(|i| match i.severity {
                Severity::Breaking => BREAKING_WEIGHT,
                Severity::Warning => WARNING_WEIGHT,
                Severity::Info => INFO_WEIGHT,
            })
            .sum();
        total.min(100.0)
    }

    /// 要約文: "2 breaking, 1 warning(s), 3 informational"
    pub fn summarize(issues: &[DriftIssue]) -> String {
        let breaking = issues
            .iter()
            .filter(|i| i.severity == Severity::Breaking)
            .count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();
        let info = issues
            .iter()
            .filter(|i| i.severity == Severity::Info)
            .count();

        let mut parts = Vec::new();
        if breaking > 0 {
            parts.push(format!("{} breaking", breaking));
        }
        if warnings > 0 {
            parts.push(format!("{} warning(s)", warnings));
        }
        if info > 0 {
            parts.push(format!("{} informational", info));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn push_issue(
    issues: &mut Vec<DriftIssue>,
    kind: IssueKind,
    severity: Severity,
    path: String,
    expected: Option<String>,
    actual: Option<String>,
) {
    let narration = narrate(kind, &path, expected.as_deref(), actual.as_deref());
    issues.push(DriftIssue {
        path,
        kind,
        severity,
        expected,
        actual,
        narration,
    });
}

/// union から fresh と同種の枝を探す
fn matching_branch<'a>(
    branches: &'a [SchemaDescriptor],
    fresh: &SchemaDescriptor,
) -> Option<&'a SchemaDescriptor> {
    branches.iter().find(|b| b.kind_name() == fresh.kind_name())
}

fn walk(
    stored: &SchemaDescriptor,
    fresh: &SchemaDescriptor,
    path: &str,
    issues: &mut Vec<DriftIssue>,
) {
    use SchemaDescriptor as S;

    match (stored, fresh) {
        (
            S::Object {
                fields: stored_fields,
                required,
                ..
            },
            S::Object {
                fields: fresh_fields,
                ..
            },
        ) => {
            // 必須フィールドの欠落
            for name in required {
                if !fresh_fields.contains_key(name) {
                    push_issue(
                        issues,
                        IssueKind::Missing,
                        Severity::Breaking,
                        join_path(path, name),
                        stored_fields
                            .get(name)
                            .map(|f| f.schema.kind_name().to_string()),
                        None,
                    );
                }
            }

            // 新出フィールド
            for (name, fresh_field) in fresh_fields {
                if !stored_fields.contains_key(name) {
                    push_issue(
                        issues,
                        IssueKind::Added,
                        Severity::Info,
                        join_path(path, name),
                        None,
                        Some(fresh_field.schema.kind_name().to_string()),
                    );
                }
            }

            // 共通フィールドを再帰比較
            for (name, stored_field) in stored_fields {
                if let Some(fresh_field) = fresh_fields.get(name) {
                    walk_field(
                        stored_field.nullable,
                        &stored_field.schema,
                        &fresh_field.schema,
                        &join_path(path, name),
                        issues,
                    );
                }
            }
        }

        (
            S::Array {
                items: Some(stored_items),
                ..
            },
            S::Array {
                items: Some(fresh_items),
                ..
            },
        ) => {
            walk_field(
                stored_items.nullable,
                &stored_items.schema,
                &fresh_items.schema,
                path,
                issues,
            );
        }
        (S::Array { .. }, S::Array { .. }) => {}

        (
            S::Union {
                branches: stored_branches,
                ..
            },
            S::Union {
                branches: fresh_branches,
                ..
            },
        ) => {
            for fresh_branch in fresh_branches {
                if let Some(stored_branch) = matching_branch(stored_branches, fresh_branch) {
                    walk(stored_branch, fresh_branch, path, issues);
                } else if !matches!(fresh_branch, S::Null { .. }) {
                    push_issue(
                        issues,
                        IssueKind::TypeChanged,
                        Severity::Breaking,
                        root_or(path),
                        Some(stored.kind_name().to_string()),
                        Some(fresh_branch.kind_name().to_string()),
                    );
                }
            }
        }

        // 保存側が union: 新観測と同種の枝があればそれと比較
        (S::Union { branches, .. }, _) => {
            if let Some(branch) = matching_branch(branches, fresh) {
                walk(branch, fresh, path, issues);
            } else if !matches!(fresh, S::Null { .. }) {
                push_issue(
                    issues,
                    IssueKind::TypeChanged,
                    Severity::Breaking,
                    root_or(path),
                    Some(stored.kind_name().to_string()),
                    Some(fresh.kind_name().to_string()),
                );
            }
        }

        (
            S::String { hint: stored_hint, .. },
            S::String { hint: fresh_hint, .. },
        ) => {
            // フォーマットヒントの変化は互換だが警告に値する
            if stored_hint.is_some() && stored_hint != fresh_hint {
                push_issue(
                    issues,
                    IssueKind::TypeChanged,
                    Severity::Warning,
                    root_or(path),
                    Some(format!("string ({:?})", stored_hint.unwrap())),
                    Some("string".to_string()),
                );
            }
        }

        (S::Null { .. }, S::Null { .. }) => {}

        // null しか観測されていなかったフィールドに型が付いた: 安全な変化
        (S::Null { .. }, _) => {
            push_issue(
                issues,
                IssueKind::TypeChanged,
                Severity::Info,
                root_or(path),
                Some("null".to_string()),
                Some(fresh.kind_name().to_string()),
            );
        }

        _ => {
            if stored.kind_name() != fresh.kind_name() {
                push_issue(
                    issues,
                    IssueKind::TypeChanged,
                    Severity::Breaking,
                    root_or(path),
                    Some(stored.kind_name().to_string()),
                    Some(fresh.kind_name().to_string()),
                );
            }
        }
    }
}

/// フィールドラッパー越しの比較: null 観測は nullable なら許容する
fn walk_field(
    stored_nullable: bool,
    stored: &SchemaDescriptor,
    fresh: &SchemaDescriptor,
    path: &str,
    issues: &mut Vec<DriftIssue>,
) {
    use SchemaDescriptor as S;

    if matches!(fresh, S::Null { .. }) {
        if !stored_nullable {
            push_issue(
                issues,
                IssueKind::TypeChanged,
                Severity::Warning,
                path.to_string(),
                Some(stored.kind_name().to_string()),
                Some("null".to_string()),
            );
        }
        return;
    }
    walk(stored, fresh, path, issues);
}

fn root_or(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn learned(values: &[serde_json::Value]) -> SchemaDescriptor {
        let mut iter = values.iter();
        let mut schema = SchemaDescriptor::infer(iter.next().expect("at least one value"));
        for v in iter {
            schema = schema.observe(v);
        }
        schema
    }

    #[test]
    fn test_gate_below_min_observations() {
        let detector = DriftDetector::new();
        let stored = learned(&[json!({"a": 1, "b": 2})]);
        let fresh = SchemaDescriptor::infer(&json!({"a": 1}));
        assert!(detector.detect(&stored, &fresh).is_empty());
    }

    #[test]
    fn test_missing_required_field_is_breaking() {
        let detector = DriftDetector::new();
        let body = json!({"a": 1, "b": 2});
        let stored = learned(&[body.clone(), body.clone(), body.clone()]);
        let fresh = SchemaDescriptor::infer(&json!({"a": 1}));

        let issues = detector.detect(&stored, &fresh);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Missing);
        assert_eq!(issues[0].severity, Severity::Breaking);
        assert_eq!(issues[0].path, "b");
        assert!(DriftDetector::score(&issues) >= 40.0);
    }

    #[test]
    fn test_optional_field_absence_is_not_drift() {
        let detector = DriftDetector::new();
        let stored = learned(&[
            json!({"a": 1, "b": 2}),
            json!({"a": 1}),
            json!({"a": 1, "b": 2}),
        ]);
        // b は optional になっているので欠落は報告されない
        let fresh = SchemaDescriptor::infer(&json!({"a": 1}));
        assert!(detector.detect(&stored, &fresh).is_empty());
    }

    #[test]
    fn test_added_field_is_info() {
        let detector = DriftDetector::new();
        let body = json!({"a": 1});
        let stored = learned(&[body.clone(), body.clone(), body.clone()]);
        let fresh = SchemaDescriptor::infer(&json!({"a": 1, "shiny": true}));

        let issues = detector.detect(&stored, &fresh);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Added);
        assert_eq!(issues[0].severity, Severity::Info);
        assert_eq!(DriftDetector::score(&issues), 3.0);
    }

    #[test]
    fn test_type_change_is_breaking() {
        let detector = DriftDetector::new();
        let body = json!({"id": 1});
        let stored = learned(&[body.clone(), body.clone(), body.clone()]);
        let fresh = SchemaDescriptor::infer(&json!({"id": "abc"}));

        let issues = detector.detect(&stored, &fresh);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::TypeChanged);
        assert_eq!(issues[0].severity, Severity::Breaking);
        assert_eq!(issues[0].expected.as_deref(), Some("number"));
        assert_eq!(issues[0].actual.as_deref(), Some("string"));
    }

    #[test]
    fn test_nested_paths_use_dot_notation() {
        let detector = DriftDetector::new();
        let body = json!({"data": {"user": {"email": "a@b.com"}}});
        let stored = learned(&[body.clone(), body.clone(), body.clone()]);
        let fresh = SchemaDescriptor::infer(&json!({"data": {"user": {}}}));

        let issues = detector.detect(&stored, &fresh);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "data.user.email");
    }

    #[test]
    fn test_nullable_field_tolerates_null() {
        let detector = DriftDetector::new();
        let stored = learned(&[
            json!({"note": "x"}),
            json!({"note": null}),
            json!({"note": "y"}),
        ]);
        let fresh = SchemaDescriptor::infer(&json!({"note": null}));
        assert!(detector.detect(&stored, &fresh).is_empty());
    }

    #[test]
    fn test_score_caps_at_100() {
        let issues: Vec<DriftIssue> = (0..5)
            .map(|i| DriftIssue {
                path: format!("f{}", i),
                kind: IssueKind::Missing,
                severity: Severity::Breaking,
                expected: None,
                actual: None,
                narration: String::new(),
            })
            .collect();
        assert_eq!(DriftDetector::score(&issues), 100.0);
    }

    #[test]
    fn test_summarize() {
        let issues = vec![
            DriftIssue {
                path: "a".into(),
                kind: IssueKind::Missing,
                severity: Severity::Breaking,
                expected: None,
                actual: None,
                narration: String::new(),
            },
            DriftIssue {
                path: "b".into(),
                kind: IssueKind::Added,
                severity: Severity::Info,
                expected: None,
                actual: None,
                narration: String::new(),
            },
        ];
        let summary = DriftDetector::summarize(&issues);
        assert!(summary.contains("1 breaking"));
        assert!(summary.contains("1 informational"));
    }
}
