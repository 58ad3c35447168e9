use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 動作モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// バックエンドへ転送し、トラフィックから学習する
    Proxy,
    /// 学習済みモデルからレスポンスを合成する
    Mock,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(Mode::Proxy),
            "mock" => Ok(Mode::Mock),
            other => Err(format!("unknown mode '{}' (expected proxy or mock)", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Proxy => write!(f, "proxy"),
            Mode::Mock => write!(f, "mock"),
        }
    }
}

/// アプリケーション設定
///
/// 環境変数から読み込む (§ loader)。`target_url` はプロキシモードで必須。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmpConfig {
    /// 転送先バックエンド URL
    pub target_url: Option<String>,

    /// 永続化ファイルパス
    pub db_path: PathBuf,

    /// 待ち受けアドレス
    pub listen_addr: String,

    /// 起動時の動作モード
    pub mode: Mode,

    /// バックエンド障害時の自動フェイルオーバー
    pub failover: bool,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            db_path: PathBuf::from("data/amp.json"),
            listen_addr: "0.0.0.0:8000".to_string(),
            mode: Mode::Proxy,
            failover: true,
        }
    }
}
