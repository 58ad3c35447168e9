//! ドリフト検出の統合テスト

use amp_rs::drift::{DriftDetector, IssueKind, Severity};
use amp_rs::schema::SchemaDescriptor;
use serde_json::json;

fn learn(bodies: &[serde_json::Value]) -> SchemaDescriptor {
    let mut iter = bodies.iter();
    let mut schema = SchemaDescriptor::infer(iter.next().unwrap());
    for body in iter {
        schema = schema.observe(body);
    }
    schema
}

#[test]
fn test_missing_field_after_stable_observations() {
    // シナリオ: {"a":1,"b":2} を 10 回観測後、{"a":1} が届く
    let detector = DriftDetector::new();
    let stable = json!({"a": 1, "b": 2});
    let stored = learn(&vec![stable; 10]);

    let fresh = SchemaDescriptor::infer(&json!({"a": 1}));
    let issues = detector.detect(&stored, &fresh);

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Missing);
    assert_eq!(issues[0].severity, Severity::Breaking);
    assert_eq!(issues[0].path, "b");
    assert!(DriftDetector::score(&issues) >= 40.0);
    assert!(!issues[0].narration.is_empty());
}

#[test]
fn test_combined_score() {
    let detector = DriftDetector::new();
    let stable = json!({"a": 1, "b": "x", "c": true});
    let stored = learn(&vec![stable; 5]);

    // b が消え、d が増え、a の型が変わる
    let fresh = SchemaDescriptor::infer(&json!({"a": "one", "c": true, "d": 9}));
    let issues = detector.detect(&stored, &fresh);

    let breaking = issues
        .iter()
        .filter(|i| i.severity == Severity::Breaking)
        .count();
    let info = issues
        .iter()
        .filter(|i| i.severity == Severity::Info)
        .count();
    assert_eq!(breaking, 2); // missing b + type-changed a
    assert_eq!(info, 1); // added d
    assert_eq!(DriftDetector::score(&issues), 83.0); // 40*2 + 3
}

#[test]
fn test_no_drift_when_shape_matches() {
    let detector = DriftDetector::new();
    let body = json!({"id": 1, "nested": {"k": "v"}, "arr": [1, 2]});
    let stored = learn(&vec![body.clone(); 4]);

    let fresh = SchemaDescriptor::infer(&body);
    assert!(detector.detect(&stored, &fresh).is_empty());
}

#[test]
fn test_array_item_drift() {
    let detector = DriftDetector::new();
    let body = json!({"items": [{"sku": "a", "price": 1.0}]});
    let stored = learn(&vec![body; 4]);

    let fresh = SchemaDescriptor::infer(&json!({"items": [{"sku": "a"}]}));
    let issues = detector.detect(&stored, &fresh);

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Missing);
    assert_eq!(issues[0].path, "items.price");
}

#[test]
fn test_narration_includes_context_and_action() {
    let detector = DriftDetector::new();
    let body = json!({"email": "a@b.com"});
    let stored = learn(&vec![body; 3]);

    let fresh = SchemaDescriptor::infer(&json!({}));
    let issues = detector.detect(&stored, &fresh);

    assert_eq!(issues.len(), 1);
    let narration = &issues[0].narration;
    assert!(narration.contains("email"));
    assert!(narration.contains("Impact:"));
    assert!(narration.contains("Action:"));
}
