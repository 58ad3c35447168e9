//! Dispatch Core
//!
//! リクエスト毎の状態機械 (転送 / モック / フェイルオーバー) と
//! 共有アップストリームクライアント。

pub mod dispatch;
mod forwarder;

pub use forwarder::{Forwarder, UpstreamResponse};
