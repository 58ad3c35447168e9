//! Schema Learner & Synthetic Generator
//!
//! 観測した JSON ボディから再帰的な構造記述子を学習し、
//! 記述子から現実的なモック JSON を合成する。

mod descriptor;
mod generator;

pub use descriptor::{FieldDescriptor, SchemaDescriptor, StringHint};
pub use generator::MockGenerator;
