//! Drift Narrator
//!
//! 技術的なドリフト差分を、フィールド名から推定した文脈と
//! 推奨アクション付きの平易な英文に変換する。

use super::types::IssueKind;

/// フィールド名パターン → ドメイン文脈
const FIELD_CONTEXT: &[(&str, &str)] = &[
    ("avatar", "user profile images"),
    ("email", "email addresses"),
    ("name", "display names"),
    ("uuid", "unique identifiers"),
    ("id", "unique identifiers"),
    ("token", "authentication tokens"),
    ("password", "credentials"),
    ("price", "pricing information"),
    ("amount", "monetary values"),
    ("total", "totals and aggregates"),
    ("status", "status tracking"),
    ("created", "creation timestamps"),
    ("updated", "update timestamps"),
    ("url", "links"),
    ("image", "image assets"),
    ("phone", "phone numbers"),
    ("address", "addresses"),
    ("role", "user permissions"),
    ("count", "counts and quantities"),
    ("data", "response payloads"),
    ("items", "list items"),
    ("results", "query results"),
    ("error", "error handling"),
    ("message", "messaging"),
    ("description", "descriptions"),
    ("title", "titles and headings"),
];

/// パスの末尾フィールド名を取り出す
fn leaf_field(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn field_context(field: &str) -> Option<&'static str> {
    let lower = field.to_ascii_lowercase();
    FIELD_CONTEXT
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, context)| *context)
}

/// 1 つのドリフト問題を英文で説明する
pub fn narrate(
    kind: IssueKind,
    path: &str,
    expected: Option<&str>,
    actual: Option<&str>,
) -> String {
    let field = leaf_field(path);
    let mut out = match kind {
        IssueKind::Missing => format!(
            "The \"{}\" field has been removed from the response.",
            field
        ),
        IssueKind::Added => format!(
            "A new \"{}\" field has appeared in the response.",
            field
        ),
        IssueKind::TypeChanged => format!(
            "The \"{}\" field changed from {} to {}.",
            field,
            expected.unwrap_or("unknown"),
            actual.unwrap_or("unknown")
        ),
    };

    if let Some(context) = field_context(field) {
        out.push_str(&format!(" This field is related to {}.", context));
    }

    let (impact, action) = match kind {
        IssueKind::Missing => (
            "Any client that renders or references this field will break.",
            "Add a fallback default or remove the dependency on this field.",
        ),
        IssueKind::Added => (
            "This is typically safe, but may indicate an upcoming API migration.",
            "Update consumer types to include the new field.",
        ),
        IssueKind::TypeChanged => (
            "Strict comparisons and type-dependent logic may fail silently.",
            "Update the field type in your data model and check all consumers.",
        ),
    };
    out.push_str(&format!(" Impact: {} Action: {}", impact, action));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_field() {
        assert_eq!(leaf_field("data.users.avatar_url"), "avatar_url");
        assert_eq!(leaf_field("b"), "b");
    }

    #[test]
    fn test_context_lookup() {
        assert_eq!(field_context("avatar_url"), Some("user profile images"));
        assert_eq!(field_context("qqq"), None);
    }

    #[test]
    fn test_narration_mentions_field_and_action() {
        let text = narrate(IssueKind::Missing, "data.email", None, None);
        assert!(text.contains("\"email\""));
        assert!(text.contains("removed"));
        assert!(text.contains("Action:"));
        assert!(text.contains("email addresses"));
    }

    #[test]
    fn test_type_change_narration() {
        let text = narrate(
            IssueKind::TypeChanged,
            "price",
            Some("number"),
            Some("string"),
        );
        assert!(text.contains("number"));
        assert!(text.contains("string"));
    }
}
