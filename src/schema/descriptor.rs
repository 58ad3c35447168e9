//! Schema Descriptor
//!
//! JSON 値の構造を表す再帰的なタグ付き記述子。単一の値からの推論
//! (`infer`) と、観測同士の構造マージ (`merge`) を提供する。
//!
//! マージの不変条件:
//! - 構造レベルで可換・結合的 (`merge(merge(a,b),c) == merge(a,merge(b,c))`)
//! - `required` は入力それぞれの `required` の部分集合に単調減少する
//! - null と T のマージは union を作らず、フィールドの nullable ビットになる

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// 文字列フィールドのフォーマットヒント
///
/// 学習では付与されず、生成器・手動シードで割り当てられる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringHint {
    Uuid,
    Email,
    IsoDate,
    Url,
    Slug,
    Hex,
    Base64,
}

/// オブジェクトのフィールド・配列要素を包むラッパー
///
/// null 観測は記述子の union ではなく、ここに nullable として記録される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub schema: SchemaDescriptor,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDescriptor {
    pub fn infer(value: &Value) -> Self {
        Self {
            schema: SchemaDescriptor::infer(value),
            nullable: value.is_null(),
        }
    }

    /// 2つのフィールド観測をマージする
    ///
    /// どちらかが null 観測なら nullable を立て、型は非 null 側を残す。
    pub fn merge(a: FieldDescriptor, b: FieldDescriptor) -> FieldDescriptor {
        let nullable = a.nullable
            || b.nullable
            || matches!(a.schema, SchemaDescriptor::Null { .. })
            || matches!(b.schema, SchemaDescriptor::Null { .. });
        FieldDescriptor {
            schema: SchemaDescriptor::merge(a.schema, b.schema),
            nullable,
        }
    }
}

/// JSON 構造の再帰的記述子
///
/// 各ノードは観測回数を保持する。永続形式はタグ付き
/// (`{"kind": "object", "fields": {...}, "required": [...], "count": N}`)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaDescriptor {
    Null {
        count: u64,
    },
    Bool {
        count: u64,
    },
    Number {
        count: u64,
    },
    String {
        count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<StringHint>,
    },
    Object {
        fields: BTreeMap<String, FieldDescriptor>,
        required: BTreeSet<String>,
        count: u64,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<FieldDescriptor>>,
        min_len: usize,
        max_len: usize,
        count: u64,
    },
    Union {
        branches: Vec<SchemaDescriptor>,
        count: u64,
    },
}

impl SchemaDescriptor {
    /// 単一の JSON 値から記述子を推論する
    pub fn infer(value: &Value) -> SchemaDescriptor {
        match value {
            Value::Null => SchemaDescriptor::Null { count: 1 },
            Value::Bool(_) => SchemaDescriptor::Bool { count: 1 },
            Value::Number(_) => SchemaDescriptor::Number { count: 1 },
            Value::String(_) => SchemaDescriptor::String {
                count: 1,
                hint: None,
            },
            Value::Array(items) => {
                let merged = items
                    .iter()
                    .map(FieldDescriptor::infer)
                    .reduce(FieldDescriptor::merge);
                SchemaDescriptor::Array {
                    items: merged.map(Box::new),
                    min_len: items.len(),
                    max_len: items.len(),
                    count: 1,
                }
            }
            Value::Object(map) => {
                let fields: BTreeMap<String, FieldDescriptor> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), FieldDescriptor::infer(v)))
                    .collect();
                let required: BTreeSet<String> = map.keys().cloned().collect();
                SchemaDescriptor::Object {
                    fields,
                    required,
                    count: 1,
                }
            }
        }
    }

    /// 既存の記述子に新しい観測を取り込む
    pub fn observe(self, value: &Value) -> SchemaDescriptor {
        SchemaDescriptor::merge(self, SchemaDescriptor::infer(value))
    }

    /// 2つの記述子を構造マージする
    pub fn merge(a: SchemaDescriptor, b: SchemaDescriptor) -> SchemaDescriptor {
        use SchemaDescriptor::*;

        match (a, b) {
            (Null { count: ca }, Null { count: cb }) => Null { count: ca + cb },
            // null は型ではない: 観測回数だけ取り込む (nullable はフィールド側)
            (Null { count: ca }, other) => other.with_added_count(ca),
            (other, Null { count: cb }) => other.with_added_count(cb),

            (Bool { count: ca }, Bool { count: cb }) => Bool { count: ca + cb },
            (Number { count: ca }, Number { count: cb }) => Number { count: ca + cb },
            (
                String {
                    count: ca,
                    hint: ha,
                },
                String {
                    count: cb,
                    hint: hb,
                },
            ) => String {
                count: ca + cb,
                hint: if ha == hb { ha } else { None },
            },

            (
                Object {
                    fields: fa,
                    required: ra,
                    count: ca,
                },
                Object {
                    fields: fb,
                    required: rb,
                    count: cb,
                },
            ) => {
                let mut fields = fa;
                for (key, fd_b) in fb {
                    match fields.remove(&key) {
                        Some(fd_a) => {
                            fields.insert(key, FieldDescriptor::merge(fd_a, fd_b));
                        }
                        None => {
                            fields.insert(key, fd_b);
                        }
                    }
                }
                // 片側でしか観測されなかったフィールドは optional に緩和
                let required: BTreeSet<std::string::String> =
                    ra.intersection(&rb).cloned().collect();
                Object {
                    fields,
                    required,
                    count: ca + cb,
                }
            }

            (
                Array {
                    items: ia,
                    min_len: mina,
                    max_len: maxa,
                    count: ca,
                },
                Array {
                    items: ib,
                    min_len: minb,
                    max_len: maxb,
                    count: cb,
                },
            ) => {
                let items = match (ia, ib) {
                    (Some(x), Some(y)) => Some(Box::new(FieldDescriptor::merge(*x, *y))),
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (None, None) => None,
                };
                Array {
                    items,
                    min_len: mina.min(minb),
                    max_len: maxa.max(maxb),
                    count: ca + cb,
                }
            }

            (
                Union {
                    branches: ba,
                    count: ca,
                },
                Union {
                    branches: bb,
                    count: cb,
                },
            ) => {
                let mut branches = ba;
                for branch in bb {
                    union_insert(&mut branches, branch);
                }
                Union {
                    branches,
                    count: ca + cb,
                }
            }
            (
                Union {
                    branches: ba,
                    count: ca,
                },
                other,
            ) => {
                let mut branches = ba;
                let count = ca + other.count();
                union_insert(&mut branches, other);
                Union { branches, count }
            }
            (
                other,
                Union {
                    branches: bb,
                    count: cb,
                },
            ) => {
                let count = other.count() + cb;
                let mut branches = vec![other];
                for branch in bb {
                    union_insert(&mut branches, branch);
                }
                branches.sort_by_key(SchemaDescriptor::kind_rank);
                Union { branches, count }
            }

            // 異なる種別同士: union を形成
            (x, y) => {
                let count = x.count() + y.count();
                let mut branches = vec![x];
                union_insert(&mut branches, y);
                Union { branches, count }
            }
        }
    }

    /// このノードの観測回数
    pub fn count(&self) -> u64 {
        match self {
            SchemaDescriptor::Null { count }
            | SchemaDescriptor::Bool { count }
            | SchemaDescriptor::Number { count }
            | SchemaDescriptor::String { count, .. }
            | SchemaDescriptor::Object { count, .. }
            | SchemaDescriptor::Array { count, .. }
            | SchemaDescriptor::Union { count, .. } => *count,
        }
    }

    /// 種別名 (ドリフト報告・永続形式で使用)
    pub fn kind_name(&self) -> &'static str {
        match self {
            SchemaDescriptor::Null { .. } => "null",
            SchemaDescriptor::Bool { .. } => "bool",
            SchemaDescriptor::Number { .. } => "number",
            SchemaDescriptor::String { .. } => "string",
            SchemaDescriptor::Object { .. } => "object",
            SchemaDescriptor::Array { .. } => "array",
            SchemaDescriptor::Union { .. } => "union",
        }
    }

    pub fn hint(&self) -> Option<StringHint> {
        match self {
            SchemaDescriptor::String { hint, .. } => *hint,
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            SchemaDescriptor::Null { .. } => 0,
            SchemaDescriptor::Bool { .. } => 1,
            SchemaDescriptor::Number { .. } => 2,
            SchemaDescriptor::String { .. } => 3,
            SchemaDescriptor::Object { .. } => 4,
            SchemaDescriptor::Array { .. } => 5,
            SchemaDescriptor::Union { .. } => 6,
        }
    }

    fn with_added_count(self, extra: u64) -> SchemaDescriptor {
        use SchemaDescriptor::*;
        match self {
            Null { count } => Null { count: count + extra },
            Bool { count } => Bool { count: count + extra },
            Number { count } => Number { count: count + extra },
            String { count, hint } => String {
                count: count + extra,
                hint,
            },
            Object {
                fields,
                required,
                count,
            } => Object {
                fields,
                required,
                count: count + extra,
            },
            Array {
                items,
                min_len,
                max_len,
                count,
            } => Array {
                items,
                min_len,
                max_len,
                count: count + extra,
            },
            Union { branches, count } => Union {
                branches,
                count: count + extra,
            },
        }
    }
}

/// union の枝へ記述子を取り込む
///
/// 同種の枝があれば再帰マージし、なければ追加する。枝は種別順に
/// 正規化され、構造比較が順序に依存しないようにする。
fn union_insert(branches: &mut Vec<SchemaDescriptor>, desc: SchemaDescriptor) {
    if let Some(pos) = branches
        .iter()
        .position(|b| b.kind_rank() == desc.kind_rank())
    {
        let existing = branches.remove(pos);
        branches.push(SchemaDescriptor::merge(existing, desc));
    } else {
        branches.push(desc);
    }
    branches.sort_by_key(SchemaDescriptor::kind_rank);
}
