use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// 接続タイムアウト
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// リクエスト全体のタイムアウト
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// アップストリームからの応答
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 共有アップストリームクライアント
///
/// 1 プロセスに 1 つの `reqwest::Client` を共有する。リダイレクトは
/// 追わず、そのままクライアントへ返す。
pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
}

impl Forwarder {
    pub fn new(target_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::Upstream)?;

        Ok(Self {
            client,
            base_url: target_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// リクエストをアップストリームへ転送する
    ///
    /// 接続失敗・タイムアウトは `Err` で返り、呼び出し側が
    /// フェイルオーバーを判断する。リクエストのキャンセルは
    /// この Future のドロップでそのまま伝播する。
    pub async fn forward(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> std::result::Result<UpstreamResponse, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!("→ Forwarding {} {}", method, url);

        let mut outbound = HeaderMap::new();
        for (name, value) in headers {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            outbound.insert(name.clone(), value.clone());
        }

        let response = self
            .client
            .request(method.clone(), &url)
            .headers(outbound)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// 転送してはならないホップバイホップヘッダ
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "host"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
