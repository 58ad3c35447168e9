//! Chaos Engineering Profiles
//!
//! 障害注入の設定。グローバル + エンドポイント別のプロファイルを
//! 1 つの不変値としてポインタスワップで差し替える。読み手はロックしない。

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::behavior::EndpointKey;
use crate::error::{Error, Result};

/// 注入遅延の上限 (30 秒)
pub const MAX_EXTRA_LATENCY_MS: u64 = 30_000;

/// 障害注入プロファイル
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosProfile {
    /// 転送をスキップして障害を合成する確率 [0,1]
    #[serde(default)]
    pub failure_probability: f64,
    /// 追加遅延 (ms)
    #[serde(default)]
    pub extra_latency_ms: u64,
    /// 固定ステータスコードで即応答する
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_status_code: Option<u16>,
}

impl ChaosProfile {
    /// 何も注入しないプロファイルか
    pub fn is_noop(&self) -> bool {
        self.failure_probability <= 0.0
            && self.extra_latency_ms == 0
            && self.forced_status_code.is_none()
    }

    /// 入力検証 (管理 API 用)
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_probability) {
            return Err(Error::InvalidInput(
                "failure_probability must be within [0, 1]".to_string(),
            ));
        }
        if let Some(code) = self.forced_status_code {
            if !(100..=599).contains(&code) {
                return Err(Error::InvalidInput(format!(
                    "forced_status_code {} is not a valid HTTP status",
                    code
                )));
            }
        }
        Ok(())
    }

    /// 注入遅延を上限にクランプして返す
    pub fn clamped_latency_ms(&self) -> u64 {
        self.extra_latency_ms.min(MAX_EXTRA_LATENCY_MS)
    }
}

/// 名前付きプリセット
pub fn preset(name: &str) -> Option<ChaosProfile> {
    match name {
        "normal" => Some(ChaosProfile::default()),
        "friday_afternoon" => Some(ChaosProfile {
            failure_probability: 0.3,
            extra_latency_ms: 1000,
            forced_status_code: None,
        }),
        "db_bottleneck" => Some(ChaosProfile {
            failure_probability: 0.0,
            extra_latency_ms: 5000,
            forced_status_code: None,
        }),
        "blackout" => Some(ChaosProfile {
            failure_probability: 1.0,
            extra_latency_ms: 0,
            forced_status_code: Some(503),
        }),
        _ => None,
    }
}

pub fn preset_names() -> &'static [&'static str] {
    &["normal", "friday_afternoon", "db_bottleneck", "blackout"]
}

/// 現在有効な注入設定 (不変スナップショット)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaosSettings {
    pub global: ChaosProfile,
    /// "METHOD pattern" → プロファイル
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_endpoint: HashMap<String, ChaosProfile>,
}

/// 注入設定のレジストリ
///
/// 書き込みはスナップショットを複製して差し替える。
pub struct ChaosRegistry {
    settings: ArcSwap<ChaosSettings>,
}

impl ChaosRegistry {
    pub fn new() -> Self {
        Self {
            settings: ArcSwap::from_pointee(ChaosSettings::default()),
        }
    }

    /// 現在のスナップショットを取得する (ロックなし)
    pub fn current(&self) -> Arc<ChaosSettings> {
        self.settings.load_full()
    }

    /// エンドポイントに適用するプロファイル
    pub fn profile_for(&self, key: &EndpointKey) -> ChaosProfile {
        let settings = self.settings.load();
        settings
            .per_endpoint
            .get(&key.to_string())
            .cloned()
            .unwrap_or_else(|| settings.global.clone())
    }

    pub fn set_global(&self, profile: ChaosProfile) -> Result<()> {
        profile.validate()?;
        let mut next = (*self.settings.load_full()).clone();
        next.global = profile;
        self.settings.store(Arc::new(next));
        Ok(())
    }

    pub fn set_endpoint(&self, key: &EndpointKey, profile: ChaosProfile) -> Result<()> {
        profile.validate()?;
        let mut next = (*self.settings.load_full()).clone();
        if profile.is_noop() {
            next.per_endpoint.remove(&key.to_string());
        } else {
            next.per_endpoint.insert(key.to_string(), profile);
        }
        self.settings.store(Arc::new(next));
        Ok(())
    }

    pub fn apply_preset(&self, name: &str) -> Result<()> {
        let profile = preset(name).ok_or_else(|| {
            Error::InvalidInput(format!(
                "unknown chaos preset '{}' (available: {})",
                name,
                preset_names().join(", ")
            ))
        })?;
        self.set_global(profile)
    }
}

impl Default for ChaosRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_noop() {
        assert!(ChaosProfile::default().is_noop());
    }

    #[test]
    fn test_validation() {
        let bad = ChaosProfile {
            failure_probability: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad_status = ChaosProfile {
            forced_status_code: Some(42),
            ..Default::default()
        };
        assert!(bad_status.validate().is_err());
    }

    #[test]
    fn test_latency_clamped() {
        let profile = ChaosProfile {
            extra_latency_ms: 120_000,
            ..Default::default()
        };
        assert_eq!(profile.clamped_latency_ms(), MAX_EXTRA_LATENCY_MS);
    }

    #[test]
    fn test_endpoint_override_wins() {
        let registry = ChaosRegistry::new();
        let key = EndpointKey::new("GET", "/items");

        registry
            .set_global(ChaosProfile {
                extra_latency_ms: 100,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(registry.profile_for(&key).extra_latency_ms, 100);

        registry
            .set_endpoint(
                &key,
                ChaosProfile {
                    extra_latency_ms: 900,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(registry.profile_for(&key).extra_latency_ms, 900);

        // noop 設定で上書きを解除
        registry
            .set_endpoint(&key, ChaosProfile::default())
            .unwrap();
        assert_eq!(registry.profile_for(&key).extra_latency_ms, 100);
    }

    #[test]
    fn test_presets() {
        assert!(preset("normal").unwrap().is_noop());
        assert_eq!(preset("friday_afternoon").unwrap().failure_probability, 0.3);
        assert!(preset("nope").is_none());

        let registry = ChaosRegistry::new();
        assert!(registry.apply_preset("blackout").is_ok());
        assert_eq!(
            registry.current().global.forced_status_code,
            Some(503)
        );
        assert!(registry.apply_preset("nope").is_err());
    }
}
