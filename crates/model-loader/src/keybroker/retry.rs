//! # 鍵転送のリトライ
//!
//! - 接続レベルの失敗のみ、`RetryPolicy::max_attempts` 回まで試行する
//! - HTTP 200 を受けた時点で終了する
//! - 200以外のステータスは即座に終了（リトライしない）
//! - 試行間はポリシーに従って指数バックオフする
//! - キャンセル時は試行中のリクエストを破棄し、以降試行しない

use tokio_util::sync::CancellationToken;

use super::transport::{TransferTransport, TransportError};
use crate::config::RetryPolicy;
use crate::error::LoaderError;
use crate::infra::http_client::HttpResponse;

/// リトライしながらPOSTし、HTTP 200のレスポンスを返す。
pub async fn post_with_retry(
    transport: &dyn TransferTransport,
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<HttpResponse, LoaderError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoaderError::Cancelled),
            r = transport.post(url, headers, body) => r,
        };

        match result {
            Ok(resp) if resp.status == 200 => {
                tracing::debug!("鍵ブローカーが応答しました (試行 {attempt}/{max_attempts})");
                return Ok(resp);
            }
            Ok(resp) => {
                return Err(LoaderError::KeyBrokerUnreachable(format!(
                    "予期しないステータス {} ({url})",
                    resp.status
                )));
            }
            Err(TransportError::Connect(msg)) => {
                tracing::warn!("鍵ブローカーへの接続に失敗 (試行 {attempt}/{max_attempts}): {msg}");
                last_error = msg;
            }
            Err(TransportError::Other(msg)) => {
                return Err(LoaderError::KeyBrokerUnreachable(format!("{msg} ({url})")));
            }
        }

        if attempt < max_attempts {
            let wait = policy.backoff_after(attempt);
            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LoaderError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }

    Err(LoaderError::KeyBrokerUnreachable(format!(
        "{max_attempts}回接続に失敗しました ({url}): {last_error}"
    )))
}
