//! Synthetic Mock Generator
//!
//! 学習済み記述子から現実的な JSON インスタンスを合成する。
//! フィールド名ヒューリスティクスで意味のある値を生成し、リクエスト
//! ボディに同名・互換型のフィールドがあればその値をエコーする。

use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::descriptor::{SchemaDescriptor, StringHint};

/// フィールド名から推定する意味型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SemanticKind {
    Uuid,
    Id,
    Email,
    Phone,
    FirstName,
    LastName,
    FullName,
    ImageUrl,
    Url,
    DatetimePast,
    DatetimeRecent,
    DatetimeFuture,
    Money,
    Currency,
    PositiveInt,
    Latitude,
    Longitude,
    Percentage,
    Title,
    Description,
    Paragraph,
    Tag,
    Status,
    BooleanTrue,
    BooleanFalse,
    City,
    State,
    Country,
    ZipCode,
    Address,
    Token,
    Hash,
    Color,
    Ipv4,
}

/// フィールド名パターン → 意味型の対応表
///
/// 先勝ち。部分一致は大文字小文字を無視して行う。
const FIELD_PATTERNS: &[(&[&str], SemanticKind)] = &[
    // Identifiers
    (&["uuid"], SemanticKind::Uuid),
    (&["_id", "id"], SemanticKind::Id),
    // Contact / Personal
    (&["email", "e_mail", "mail"], SemanticKind::Email),
    (&["phone", "mobile", "tel", "fax"], SemanticKind::Phone),
    (&["first_name", "firstname", "fname"], SemanticKind::FirstName),
    (
        &["last_name", "lastname", "lname", "surname"],
        SemanticKind::LastName,
    ),
    (
        &[
            "full_name", "fullname", "display_name", "displayname", "username", "user_name",
            "author", "owner", "name",
        ],
        SemanticKind::FullName,
    ),
    // URLs and images
    (
        &[
            "avatar", "photo", "image", "img", "thumbnail", "thumb", "picture", "pic", "logo",
            "icon", "banner", "cover",
        ],
        SemanticKind::ImageUrl,
    ),
    (
        &[
            "url", "link", "href", "website", "homepage", "uri", "endpoint", "callback",
        ],
        SemanticKind::Url,
    ),
    // Date/Time
    (
        &[
            "created_at", "createdat", "created", "date_created", "creation_date", "registered",
            "signup_date", "joined",
        ],
        SemanticKind::DatetimePast,
    ),
    (
        &[
            "updated_at", "updatedat", "modified", "modified_at", "last_modified", "edited_at",
            "last_seen", "last_login", "last_active",
        ],
        SemanticKind::DatetimeRecent,
    ),
    (
        &[
            "expires", "expiry", "expires_at", "expiration", "valid_until", "due_date",
            "deadline", "scheduled_at",
        ],
        SemanticKind::DatetimeFuture,
    ),
    (
        &["date", "time", "timestamp", "datetime", "when"],
        SemanticKind::DatetimePast,
    ),
    // Monetary / Numeric
    (
        &[
            "price", "cost", "amount", "total", "subtotal", "tax", "fee", "charge", "balance",
            "salary", "wage", "revenue", "discount", "tip",
        ],
        SemanticKind::Money,
    ),
    (&["currency", "currency_code"], SemanticKind::Currency),
    (
        &[
            "count", "quantity", "qty", "num", "number", "size", "length", "followers",
            "following", "friends", "likes", "views", "downloads", "rating", "score", "rank",
            "level", "age", "year",
        ],
        SemanticKind::PositiveInt,
    ),
    (&["lat", "latitude"], SemanticKind::Latitude),
    (&["lng", "lon", "longitude"], SemanticKind::Longitude),
    (
        &["percent", "percentage", "ratio", "rate"],
        SemanticKind::Percentage,
    ),
    // Text content
    (
        &["title", "subject", "headline", "heading"],
        SemanticKind::Title,
    ),
    (
        &[
            "description", "desc", "summary", "abstract", "excerpt", "overview", "bio", "about",
            "blurb",
        ],
        SemanticKind::Description,
    ),
    (
        &[
            "body", "content", "text", "message", "comment", "note", "details", "instructions",
            "remarks",
        ],
        SemanticKind::Paragraph,
    ),
    (
        &["tag", "label", "category", "kind", "group", "role"],
        SemanticKind::Tag,
    ),
    // Status / State
    (&["status", "state", "phase"], SemanticKind::Status),
    (
        &[
            "active", "enabled", "visible", "published", "verified", "confirmed", "approved",
            "available", "online", "is_active", "is_enabled",
        ],
        SemanticKind::BooleanTrue,
    ),
    (
        &[
            "deleted", "archived", "disabled", "blocked", "banned", "suspended", "is_deleted",
            "is_archived",
        ],
        SemanticKind::BooleanFalse,
    ),
    // Address
    (&["city"], SemanticKind::City),
    (&["province", "region"], SemanticKind::State),
    (
        &["country", "country_code", "nation"],
        SemanticKind::Country,
    ),
    (
        &["zip", "zipcode", "zip_code", "postal", "postal_code", "postcode"],
        SemanticKind::ZipCode,
    ),
    (
        &["address", "street", "address_line"],
        SemanticKind::Address,
    ),
    // Tokens / Hashes
    (
        &[
            "token", "access_token", "refresh_token", "api_key", "apikey", "secret", "session",
            "session_id", "jwt",
        ],
        SemanticKind::Token,
    ),
    (
        &[
            "hash", "checksum", "md5", "sha", "sha256", "sha1", "digest", "fingerprint",
        ],
        SemanticKind::Hash,
    ),
    // Color
    (
        &["color", "colour", "hex_color", "background", "bg_color"],
        SemanticKind::Color,
    ),
    // IP / Network
    (
        &["ip", "ip_address", "ipv4", "remote_addr", "client_ip"],
        SemanticKind::Ipv4,
    ),
];

const FIRST_NAMES: &[&str] = &[
    "Aarav", "Sophia", "Liam", "Aisha", "Mateo", "Yuki", "Oliver", "Mei", "Noah", "Zara",
    "Ethan", "Priya", "Lucas", "Sara", "Arjun", "Elena", "Kai", "Amara", "Leo", "Ananya",
    "James", "Luna", "Raj", "Isla", "Omar", "Chloe", "Ravi", "Hana", "Daniel", "Fatima",
];

const LAST_NAMES: &[&str] = &[
    "Patel", "Kim", "Garcia", "Chen", "Smith", "Tanaka", "Singh", "Johnson", "Ali",
    "Williams", "Nakamura", "Brown", "Lee", "Wilson", "Kumar", "Silva", "Andersen",
    "Martinez", "Wang", "Taylor", "Gupta", "Hernandez", "Park", "Thompson", "Shah",
    "Rodriguez", "Sato", "Moore", "Das",
];

const DOMAINS: &[&str] = &[
    "gmail.com", "outlook.com", "company.io", "example.org", "mail.dev", "proton.me",
    "fastmail.com", "hey.com", "icloud.com", "pm.me",
];

const CITIES: &[&str] = &[
    "San Francisco", "London", "Tokyo", "Mumbai", "Berlin", "Toronto", "Sydney", "Singapore",
    "Amsterdam", "Seoul", "Dubai", "Stockholm", "Austin", "Barcelona", "Bangalore", "Paris",
    "New York",
];

const COUNTRIES: &[&str] = &[
    "US", "GB", "JP", "IN", "DE", "CA", "AU", "SG", "NL", "KR", "AE", "BR", "SE", "ES", "FR",
    "IT", "CH", "NO", "DK", "FI",
];

const STATUSES: &[&str] = &["active", "pending", "inactive"];

const TITLES: &[&str] = &[
    "Getting Started with the API",
    "Quarterly Performance Report",
    "Project Update: Phase 2",
    "New Feature Announcement",
    "Infrastructure Migration Plan",
    "Team Standup Notes",
    "Customer Feedback Summary",
    "Product Roadmap Q3",
    "Security Audit Results",
    "Release Notes v2.4",
];

const TAGS: &[&str] = &[
    "featured", "important", "beta", "stable", "experimental", "premium", "free", "popular",
    "trending", "new", "admin", "user", "moderator", "editor", "viewer",
];

const DESCRIPTIONS: &[&str] = &[
    "A comprehensive overview of the latest updates and improvements.",
    "This resource provides detailed information about the service.",
    "Automatically generated content based on observed API patterns.",
    "Key insights derived from production traffic analysis.",
    "A curated collection of data points for this entity.",
];

const COLORS: &[&str] = &[
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9",
];

const CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "JPY", "INR", "CAD", "AUD", "CHF"];

const US_STATES: &[&str] = &["CA", "NY", "TX", "FL", "WA", "IL", "MA", "CO", "GA", "PA"];

/// フィールド名から意味型を推定する
fn detect_semantic(field_name: &str) -> Option<SemanticKind> {
    let lower = field_name.trim().to_ascii_lowercase();

    for (patterns, kind) in FIELD_PATTERNS {
        for pattern in *patterns {
            if lower == *pattern
                || lower.ends_with(pattern)
                || lower.starts_with(pattern)
                || lower.contains(&format!("_{}", pattern))
                || lower.contains(&format!("{}_", pattern))
            {
                return Some(*kind);
            }
        }
    }

    None
}

/// モックレスポンス生成器
///
/// `deterministic` のとき union は最初の非 null 枝を選ぶ。
/// それ以外は観測回数による重み付き選択。
pub struct MockGenerator {
    deterministic: bool,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            deterministic: false,
        }
    }

    /// シード付き RNG と併用する決定的な生成器
    pub fn deterministic() -> Self {
        Self {
            deterministic: true,
        }
    }

    /// 記述子から JSON 値を合成する
    pub fn generate(&self, schema: &SchemaDescriptor, request: Option<&Value>) -> Value {
        let mut rng = rand::thread_rng();
        self.generate_with_rng(schema, request, &mut rng)
    }

    pub fn generate_with_rng<R: Rng>(
        &self,
        schema: &SchemaDescriptor,
        request: Option<&Value>,
        rng: &mut R,
    ) -> Value {
        self.generate_node(schema, request, "", rng)
    }

    fn generate_node<R: Rng>(
        &self,
        schema: &SchemaDescriptor,
        request: Option<&Value>,
        field_name: &str,
        rng: &mut R,
    ) -> Value {
        match schema {
            SchemaDescriptor::Null { .. } => Value::Null,
            SchemaDescriptor::Bool { .. } => self.generate_bool(field_name, rng),
            SchemaDescriptor::Number { .. } => self.generate_number(field_name, rng),
            SchemaDescriptor::String { hint, .. } => {
                self.generate_string(field_name, *hint, rng)
            }
            SchemaDescriptor::Object { fields, .. } => {
                let mut out = Map::new();
                for (key, field) in fields {
                    // エコー規則: リクエストに同名・互換型の素朴値があればそれを返す
                    if let Some(echoed) = echo_from_request(request, key, &field.schema) {
                        out.insert(key.clone(), echoed);
                        continue;
                    }
                    let nested_request = request
                        .and_then(|r| r.as_object())
                        .and_then(|m| m.get(key));
                    out.insert(
                        key.clone(),
                        self.generate_node(&field.schema, nested_request, key, rng),
                    );
                }
                Value::Object(out)
            }
            SchemaDescriptor::Array {
                items, min_len, ..
            } => {
                let Some(items) = items else {
                    return Value::Array(Vec::new());
                };
                let mut n = rng.gen_range(1..=3usize);
                if *min_len > n {
                    n = *min_len;
                }
                let elements = (0..n)
                    .map(|_| self.generate_node(&items.schema, None, field_name, rng))
                    .collect();
                Value::Array(elements)
            }
            SchemaDescriptor::Union { branches, .. } => {
                let Some(branch) = self.pick_branch(branches, rng) else {
                    return Value::Null;
                };
                self.generate_node(branch, request, field_name, rng)
            }
        }
    }

    /// union 枝の選択
    fn pick_branch<'a, R: Rng>(
        &self,
        branches: &'a [SchemaDescriptor],
        rng: &mut R,
    ) -> Option<&'a SchemaDescriptor> {
        let non_null: Vec<&SchemaDescriptor> = branches
            .iter()
            .filter(|b| !matches!(b, SchemaDescriptor::Null { .. }))
            .collect();

        if non_null.is_empty() {
            return None;
        }
        if self.deterministic {
            return Some(non_null[0]);
        }

        let total: u64 = non_null.iter().map(|b| b.count()).sum();
        if total == 0 {
            return Some(non_null[0]);
        }
        let mut pick = rng.gen_range(0..total);
        for branch in &non_null {
            let c = branch.count();
            if pick < c {
                return Some(*branch);
            }
            pick -= c;
        }
        Some(non_null[0])
    }

    fn generate_bool<R: Rng>(&self, field_name: &str, rng: &mut R) -> Value {
        match detect_semantic(field_name) {
            Some(SemanticKind::BooleanTrue) => json!(rng.gen::<f64>() > 0.15),
            Some(SemanticKind::BooleanFalse) => json!(rng.gen::<f64>() > 0.85),
            _ => json!(rng.gen::<bool>()),
        }
    }

    fn generate_number<R: Rng>(&self, field_name: &str, rng: &mut R) -> Value {
        match detect_semantic(field_name) {
            Some(SemanticKind::Money) => {
                let v: f64 = rng.gen_range(1.0..9999.0);
                json!((v * 100.0).round() / 100.0)
            }
            Some(SemanticKind::PositiveInt) => json!(rng.gen_range(0..=100)),
            Some(SemanticKind::Latitude) => {
                let v: f64 = rng.gen_range(-90.0..90.0);
                json!((v * 1e6).round() / 1e6)
            }
            Some(SemanticKind::Longitude) => {
                let v: f64 = rng.gen_range(-180.0..180.0);
                json!((v * 1e6).round() / 1e6)
            }
            Some(SemanticKind::Percentage) => {
                let v: f64 = rng.gen_range(0.0..100.0);
                json!((v * 10.0).round() / 10.0)
            }
            Some(SemanticKind::Id) => json!(rng.gen_range(1000..99999)),
            _ => json!(rng.gen_range(0..=100)),
        }
    }

    fn generate_string<R: Rng>(
        &self,
        field_name: &str,
        hint: Option<StringHint>,
        rng: &mut R,
    ) -> Value {
        if let Some(hint) = hint {
            return json!(generate_hinted(hint, rng));
        }

        let value = match detect_semantic(field_name) {
            Some(SemanticKind::Uuid) | Some(SemanticKind::Id) => Uuid::new_v4().to_string(),
            Some(SemanticKind::Email) => {
                let first = pick(FIRST_NAMES, rng).to_ascii_lowercase();
                let last = pick(LAST_NAMES, rng).to_ascii_lowercase();
                format!("{}.{}@{}", first, last, pick(DOMAINS, rng))
            }
            Some(SemanticKind::Phone) => format!(
                "+1-{}-{}-{}",
                rng.gen_range(200..1000),
                rng.gen_range(100..1000),
                rng.gen_range(1000..10000)
            ),
            Some(SemanticKind::FirstName) => pick(FIRST_NAMES, rng).to_string(),
            Some(SemanticKind::LastName) => pick(LAST_NAMES, rng).to_string(),
            Some(SemanticKind::FullName) => {
                format!("{} {}", pick(FIRST_NAMES, rng), pick(LAST_NAMES, rng))
            }
            Some(SemanticKind::ImageUrl) => format!(
                "https://picsum.photos/seed/{}/200/200",
                rng.gen_range(1..1000)
            ),
            Some(SemanticKind::Url) => {
                format!("https://example.com/{}", random_lowercase(rng, 8))
            }
            Some(SemanticKind::DatetimePast) => {
                let dt = Utc::now() - ChronoDuration::days(rng.gen_range(1..365));
                dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
            Some(SemanticKind::DatetimeRecent) => {
                let dt = Utc::now() - ChronoDuration::hours(rng.gen_range(1..72));
                dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
            Some(SemanticKind::DatetimeFuture) => {
                let dt = Utc::now() + ChronoDuration::days(rng.gen_range(1..90));
                dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
            Some(SemanticKind::Money) => format!("{:.2}", rng.gen_range(1.0..9999.0)),
            Some(SemanticKind::Currency) => pick(CURRENCIES, rng).to_string(),
            Some(SemanticKind::Title) => pick(TITLES, rng).to_string(),
            Some(SemanticKind::Description) => pick(DESCRIPTIONS, rng).to_string(),
            Some(SemanticKind::Paragraph) => {
                let mut parts: Vec<&str> = DESCRIPTIONS.to_vec();
                parts.shuffle(rng);
                parts[..3.min(parts.len())].join(" ")
            }
            Some(SemanticKind::Tag) => pick(TAGS, rng).to_string(),
            Some(SemanticKind::Status) => pick(STATUSES, rng).to_string(),
            Some(SemanticKind::City) => pick(CITIES, rng).to_string(),
            Some(SemanticKind::State) => pick(US_STATES, rng).to_string(),
            Some(SemanticKind::Country) => pick(COUNTRIES, rng).to_string(),
            Some(SemanticKind::ZipCode) => format!("{}", rng.gen_range(10000..100000)),
            Some(SemanticKind::Address) => format!(
                "{} {} {}",
                rng.gen_range(1..10000),
                pick(LAST_NAMES, rng),
                if rng.gen::<bool>() { "St" } else { "Ave" }
            ),
            Some(SemanticKind::Token) => random_alphanumeric(rng, 64),
            Some(SemanticKind::Hash) => random_hex(rng, 64),
            Some(SemanticKind::Color) => pick(COLORS, rng).to_string(),
            Some(SemanticKind::Ipv4) => format!(
                "{}.{}.{}.{}",
                rng.gen_range(10..193),
                rng.gen_range(0..256),
                rng.gen_range(0..256),
                rng.gen_range(1..255)
            ),
            _ => {
                let len = rng.gen_range(6..=12);
                random_alphanumeric(rng, len)
            }
        };

        json!(value)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// フォーマットヒント付き文字列の生成
fn generate_hinted<R: Rng>(hint: StringHint, rng: &mut R) -> String {
    match hint {
        StringHint::Uuid => Uuid::new_v4().to_string(),
        StringHint::Email => format!(
            "{}@{}",
            random_lowercase(rng, 6),
            pick(DOMAINS, rng)
        ),
        StringHint::IsoDate => Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        StringHint::Url => format!("https://example.com/{}", random_lowercase(rng, 8)),
        StringHint::Slug => format!(
            "{}-{}",
            random_lowercase(rng, 5),
            random_lowercase(rng, 5)
        ),
        StringHint::Hex => random_hex(rng, 32),
        StringHint::Base64 => random_alphanumeric(rng, 24),
    }
}

/// エコー規則の判定
///
/// リクエストの同名フィールドが素朴値で、記述子の種別と互換なら返す。
fn echo_from_request(
    request: Option<&Value>,
    key: &str,
    schema: &SchemaDescriptor,
) -> Option<Value> {
    let candidate = request?.as_object()?.get(key)?;
    if candidate.is_object() || candidate.is_array() || candidate.is_null() {
        return None;
    }
    if primitive_compatible(candidate, schema) {
        return Some(candidate.clone());
    }
    None
}

fn primitive_compatible(value: &Value, schema: &SchemaDescriptor) -> bool {
    match schema {
        SchemaDescriptor::String { .. } => value.is_string(),
        SchemaDescriptor::Number { .. } => value.is_number(),
        SchemaDescriptor::Bool { .. } => value.is_boolean(),
        SchemaDescriptor::Null { .. } => false,
        SchemaDescriptor::Union { branches, .. } => {
            branches.iter().any(|b| primitive_compatible(value, b))
        }
        _ => false,
    }
}

fn pick<'a, R: Rng>(pool: &'a [&'a str], rng: &mut R) -> &'a str {
    pool.choose(rng).copied().unwrap_or("sample")
}

fn random_alphanumeric<R: Rng>(rng: &mut R, len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn random_lowercase<R: Rng>(rng: &mut R, len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn random_hex<R: Rng>(rng: &mut R, len: usize) -> String {
    const CHARSET: &[u8] = b"0123456789abcdef";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
