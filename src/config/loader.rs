use std::path::PathBuf;

use super::types::{AmpConfig, Mode};
use crate::error::{Error, Result};

/// 環境変数から設定を読み込む
///
/// 対応する変数:
/// - `TARGET_URL`  — 転送先バックエンド (プロキシモードで必須)
/// - `DB_PATH`     — 永続化ファイルパス (デフォルト `data/amp.json`)
/// - `LISTEN_ADDR` — 待ち受けアドレス (デフォルト `:8000`)
/// - `MODE`        — `proxy` | `mock` (デフォルト `proxy`)
/// - `FAILOVER`    — `on` | `off` (デフォルト `on`)
pub fn load_from_env() -> Result<AmpConfig> {
    let mut config = AmpConfig::default();

    if let Ok(url) = std::env::var("TARGET_URL") {
        let url = url.trim().to_string();
        if !url.is_empty() {
            reqwest::Url::parse(&url)
                .map_err(|e| Error::Config(format!("TARGET_URL is not a valid URL: {}", e)))?;
            config.target_url = Some(url.trim_end_matches('/').to_string());
        }
    }

    if let Ok(path) = std::env::var("DB_PATH") {
        if !path.trim().is_empty() {
            config.db_path = PathBuf::from(path.trim());
        }
    }

    if let Ok(addr) = std::env::var("LISTEN_ADDR") {
        config.listen_addr = normalize_listen_addr(addr.trim());
    }

    if let Ok(mode) = std::env::var("MODE") {
        config.mode = mode
            .trim()
            .parse::<Mode>()
            .map_err(Error::Config)?;
    }

    if let Ok(failover) = std::env::var("FAILOVER") {
        config.failover = match failover.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            other => {
                return Err(Error::Config(format!(
                    "FAILOVER must be 'on' or 'off', got '{}'",
                    other
                )))
            }
        };
    }

    if config.mode == Mode::Proxy && config.target_url.is_none() {
        return Err(Error::Config(
            "TARGET_URL is required when MODE=proxy".to_string(),
        ));
    }

    Ok(config)
}

/// `:8000` のようなホスト省略形を `0.0.0.0:8000` に補完する
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_listen_addr() {
        assert_eq!(normalize_listen_addr(":8000"), "0.0.0.0:8000");
        assert_eq!(normalize_listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
