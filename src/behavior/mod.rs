//! Behavior Store
//!
//! エンドポイント毎の統計・スキーマ・サンプルを保持する。
//! パーティションはエンドポイントキー単位で、各パーティションが
//! 自身のロックを持つ（ホットな中央ロックを避ける）。

mod store;
mod types;

pub use store::{BehaviorStore, EndpointEntry};
pub use types::{
    truncate_example, EndpointKey, EndpointRecord, EndpointSummary, LatencyStats,
    StatusHistogram, EXAMPLE_LIMIT_BYTES,
};
