//! # HTTPクライアント
//!
//! メタデータサーバー・モデルサーバー・鍵ブローカーへの通信に使う
//! reqwestクライアントの構築と、ステータス＋ボディだけを返す薄いラッパー。
//!
//! 証明書検証は常に有効。`TlsConfig` で信頼するCAを追加・限定できる。

use std::time::Duration;

use crate::config::TlsConfig;
use crate::error::LoaderError;

/// HTTPレスポンス。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTPステータスコード
    pub status: u16,
    /// レスポンスボディ
    pub body: Vec<u8>,
}

/// JSON APIに送る共通ヘッダー
pub const JSON_HEADERS: [(&str, &str); 2] = [
    ("Accept", "application/json"),
    ("Content-Type", "application/json"),
];

/// タイムアウトとTLS設定を適用したクライアントを構築する。
///
/// `timeout` は接続確立と1回の読み出しの待ち時間に適用する。
/// 大きなモデルのダウンロード全体には上限を設けない。
pub fn build_client(timeout: Duration, tls: &TlsConfig) -> Result<reqwest::Client, LoaderError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .tls_built_in_root_certs(!tls.disable_builtin_roots);

    for path in &tls.extra_ca_pem {
        let pem = std::fs::read(path).map_err(|e| {
            LoaderError::InvalidArgument(format!("CA証明書の読み込みに失敗 ({}): {e}", path.display()))
        })?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            LoaderError::InvalidArgument(format!("CA証明書のパースに失敗 ({}): {e}", path.display()))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| LoaderError::InvalidArgument(format!("HTTPクライアントの構築に失敗: {e}")))
}

/// HTTP GETリクエストを送信する。
pub async fn get(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<HttpResponse, reqwest::Error> {
    let mut req = client.get(url);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    read_response(req.send().await?).await
}

/// HTTP POSTリクエストを送信する。
pub async fn post(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Result<HttpResponse, reqwest::Error> {
    let mut req = client.post(url).body(body.to_vec());
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    read_response(req.send().await?).await
}

async fn read_response(resp: reqwest::Response) -> Result<HttpResponse, reqwest::Error> {
    let status = resp.status().as_u16();
    let body = resp.bytes().await?.to_vec();
    Ok(HttpResponse { status, body })
}
