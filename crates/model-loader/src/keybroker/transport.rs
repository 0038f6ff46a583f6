//! # 鍵転送トランスポート
//!
//! 鍵ブローカーへのPOSTを抽象化する。リトライ判定のため、
//! 接続レベルの失敗（接続拒否・リセット等）とそれ以外を区別して返す。

use std::future::Future;
use std::pin::Pin;

use crate::infra::http_client::{self, HttpResponse};

/// トランスポートのエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// 接続レベルの失敗。リトライ対象。
    #[error("接続失敗: {0}")]
    Connect(String),
    /// それ以外の失敗。リトライしない。
    #[error("通信エラー: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    /// 接続できなかった場合と、応答ステータスを受け取る前に接続が
    /// リセット・切断された場合を接続レベルの失敗とする。
    /// タイムアウトとボディの読み出し・デコード失敗はリトライしない。
    fn from(err: reqwest::Error) -> Self {
        let connection_level =
            !err.is_timeout() && (err.is_connect() || (err.is_request() && err.status().is_none()));
        // メッセージにはURLを含めない（呼び出し側で付与する）
        let msg = err.without_url().to_string();
        if connection_level {
            TransportError::Connect(msg)
        } else {
            TransportError::Other(msg)
        }
    }
}

/// POSTの戻り値の型。
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// 鍵ブローカーへのPOSTを送るトレイト。
pub trait TransferTransport: Send + Sync {
    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'a str, &'a str)],
        body: &'a [u8],
    ) -> TransportFuture<'a>;
}

/// reqwestによる実装。
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl TransferTransport for ReqwestTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'a str, &'a str)],
        body: &'a [u8],
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            Ok(http_client::post(&self.client, url, headers, body).await?)
        })
    }
}
