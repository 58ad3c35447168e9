//! Path Normalizer
//!
//! URL パスの動的セグメントをプレースホルダに置換し、エンドポイントの
//! グルーピングキー（パターンキー）を導出する。
//!
//! 検出ルール（優先順）:
//! 1. UUID                  → `{id}`
//! 2. 整数                  → `{id}`
//! 3. 16進ハッシュ (16桁以上) → `{hash}`
//! 4. Base64風トークン       → `{token}`
//! 5. スラグ                → `{slug}`

use regex::Regex;

/// パス正規化器
///
/// 純粋関数として動作し、同じ入力は常に同じパターンキーを返す。
/// 解析できない入力はそのまま返す（決して失敗しない）。
pub struct PathNormalizer {
    uuid_re: Regex,
    int_re: Regex,
    hex_re: Regex,
    token_re: Regex,
    slug_re: Regex,
}

impl PathNormalizer {
    pub fn new() -> Self {
        Self {
            uuid_re: Regex::new(
                r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
            )
            .unwrap(),
            int_re: Regex::new(r"^-?\d+$").unwrap(),
            hex_re: Regex::new(r"(?i)^[0-9a-f]{16,}$").unwrap(),
            token_re: Regex::new(r"^[A-Za-z0-9_\-]+={0,2}$").unwrap(),
            slug_re: Regex::new(r"^[a-z0-9-]+$").unwrap(),
        }
    }

    /// パスをパターンキーに正規化する
    ///
    /// 空セグメント、先頭・末尾の `/` は構造として保持される。
    pub fn normalize(&self, path: &str) -> String {
        let normalized: Vec<String> = path
            .split('/')
            .map(|seg| self.normalize_segment(seg))
            .collect();

        let joined = normalized.join("/");
        if joined.starts_with('/') {
            joined
        } else {
            format!("/{}", joined)
        }
    }

    fn normalize_segment(&self, seg: &str) -> String {
        if seg.is_empty() {
            return String::new();
        }

        if self.uuid_re.is_match(seg) {
            return "{id}".to_string();
        }

        if self.int_re.is_match(seg) {
            return "{id}".to_string();
        }

        if self.hex_re.is_match(seg) {
            return "{hash}".to_string();
        }

        if self.is_token(seg) {
            return "{token}".to_string();
        }

        if self.is_slug(seg) {
            return "{slug}".to_string();
        }

        seg.to_string()
    }

    fn is_token(&self, seg: &str) -> bool {
        seg.len() >= 16
            && self.token_re.is_match(seg)
            && seg.chars().any(|c| c.is_ascii_digit())
            && seg.chars().any(|c| c.is_ascii_alphabetic())
    }

    fn is_slug(&self, seg: &str) -> bool {
        seg.len() >= 4
            && seg.contains('-')
            && self.slug_re.is_match(seg)
            && !seg.starts_with('-')
            && !seg.ends_with('-')
    }
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
