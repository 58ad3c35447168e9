//! モック生成の統合テスト

use amp_rs::schema::{MockGenerator, SchemaDescriptor};
use serde_json::json;

#[test]
fn test_login_echo_scenario() {
    // シナリオ: POST /login を 2 回学習後、別の資格情報でモック
    let mut schema = SchemaDescriptor::infer(&json!({"email": "a@b.com", "pw": "x"}));
    schema = schema.observe(&json!({"email": "a@b.com", "pw": "x"}));

    let generator = MockGenerator::new();
    let request = json!({"email": "z@z.com", "pw": "y"});
    let body = generator.generate(&schema, Some(&request));

    // エコー規則: リクエストの email がそのまま現れる
    assert_eq!(body["email"], json!("z@z.com"));
    // well-formed JSON オブジェクトである
    assert!(body.is_object());
    assert_eq!(body.as_object().unwrap().len(), 2);
}

#[test]
fn test_semantic_fields_look_realistic() {
    let schema = SchemaDescriptor::infer(&json!({
        "id": "550e8400-e29b-41d4-a716-446655440000",
        "email": "x@y.com",
        "created_at": "2024-01-01T00:00:00Z",
        "price": 9.99,
        "status": "active"
    }));
    let generator = MockGenerator::new();
    let body = generator.generate(&schema, None);

    let email = body["email"].as_str().unwrap();
    assert!(email.contains('@'));

    let created = body["created_at"].as_str().unwrap();
    assert!(created.contains('T') && created.ends_with('Z'));

    assert!(body["price"].is_number());

    let status = body["status"].as_str().unwrap();
    assert!(["active", "pending", "inactive"].contains(&status));
}

#[test]
fn test_nested_structure_preserved() {
    let schema = SchemaDescriptor::infer(&json!({
        "user": {
            "name": "Alice",
            "contacts": [{"kind": "email", "value": "a@b.com"}]
        }
    }));
    let generator = MockGenerator::new();
    let body = generator.generate(&schema, None);

    assert!(body["user"].is_object());
    let contacts = body["user"]["contacts"].as_array().unwrap();
    assert!(!contacts.is_empty());
    for contact in contacts {
        assert!(contact.get("kind").is_some());
        assert!(contact.get("value").is_some());
    }
}

#[test]
fn test_union_generation_is_valid_for_either_branch() {
    let mut schema = SchemaDescriptor::infer(&json!({"value": 1}));
    schema = schema.observe(&json!({"value": "one"}));

    let generator = MockGenerator::new();
    for _ in 0..20 {
        let body = generator.generate(&schema, None);
        let value = &body["value"];
        assert!(value.is_number() || value.is_string());
    }
}

#[test]
fn test_optional_fields_still_generated() {
    // 片側でしか見なかったフィールドも生成対象になる (スキーマのフィールド集合を守る)
    let mut schema = SchemaDescriptor::infer(&json!({"a": 1, "b": 2}));
    schema = schema.observe(&json!({"a": 1}));

    let generator = MockGenerator::new();
    let body = generator.generate(&schema, None);
    assert!(body.get("a").is_some());
    assert!(body.get("b").is_some());
}
