//! # Amber 鍵ブローカークライアント
//!
//! ## 鍵取得の流れ
//! 1. エフェメラルRSA鍵ペア（3072bit）を生成
//! 2. 公開鍵DERをBase64化し、`user_data` としてEvidenceに束縛
//! 3. `POST {server_url}/keys/{key_id}/transfer` に Quote と `user_data` を送信
//! 4. `wrapped_swk` を秘密鍵（RSA-OAEP）でアンラップしてSWKを得る
//! 5. `wrapped_key`（エンベロープ形式）をSWKで復号してコンテンツ鍵を得る
//!
//! ```text
//! request headers:
//!     Accept: application/json
//!     Content-Type: application/json
//!     Attestation-Type: TDX
//! request body:  {"quote": "<base64>", "user_data": "<base64>"}
//! response body: {"wrapped_key": "<base64>", "wrapped_swk": "<base64>"}
//! ```

use std::sync::Arc;

use base64::Engine;
use tokio_util::sync::CancellationToken;

use cnap_crypto::{decrypt_envelope, EphemeralKeyPair, SecretBytes, Zeroizing};
use cnap_types::{TransferRequest, TransferResponse};

use super::retry::post_with_retry;
use super::transport::TransferTransport;
use super::{BrokerKind, KeyBrokerClient, KeyFuture};
use crate::config::{CallOptions, RetryPolicy};
use crate::error::LoaderError;
use crate::runtime::EvidenceProvider;

/// 鍵転送APIのヘッダー
const TRANSFER_HEADERS: [(&str, &str); 3] = [
    ("Accept", "application/json"),
    ("Content-Type", "application/json"),
    ("Attestation-Type", "TDX"),
];

/// Base64エンジン（Standard）
pub(crate) fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 鍵転送エンドポイントのURL。`server_url` 末尾の `/` は重ねない。
pub fn transfer_url(server_url: &str, key_id: &str) -> String {
    format!("{}/keys/{key_id}/transfer", server_url.trim_end_matches('/'))
}

/// Amber KBS用の鍵ブローカークライアント。
pub struct AmberKeyBrokerClient {
    evidence: Arc<dyn EvidenceProvider>,
    transport: Arc<dyn TransferTransport>,
    retry: RetryPolicy,
}

impl AmberKeyBrokerClient {
    pub fn new(
        evidence: Arc<dyn EvidenceProvider>,
        transport: Arc<dyn TransferTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            evidence,
            transport,
            retry,
        }
    }

    async fn exchange(
        &self,
        server_url: &str,
        key_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SecretBytes, LoaderError> {
        // Step 1: 鍵ペア生成（CPU負荷が高いのでブロッキングスレッドで行う）
        let keypair = tokio::task::spawn_blocking(EphemeralKeyPair::generate)
            .await
            .map_err(|e| LoaderError::CryptoInit(format!("鍵生成タスクが異常終了: {e}")))??;
        tracing::debug!("エフェメラル鍵ペアを生成しました (fingerprint {})", keypair.fingerprint());

        // Step 2: 公開鍵に束縛したEvidenceを取得
        let user_data = b64().encode(keypair.public_key_der());
        let evidence = {
            let provider = self.evidence.clone();
            let binding = user_data.clone();
            tracing::debug!("{} Evidenceを取得中...", provider.tee_type());
            tokio::task::spawn_blocking(move || provider.get_evidence(binding.as_bytes()))
                .await
                .map_err(|e| {
                    LoaderError::EvidenceUnavailable(format!("Evidence取得タスクが異常終了: {e}"))
                })??
        };

        // Step 3: 鍵転送リクエスト
        let request = TransferRequest {
            quote: b64().encode(&evidence),
            user_data,
        };
        let body = serde_json::to_vec(&request).map_err(|e| {
            LoaderError::InvalidArgument(format!("転送リクエストのシリアライズに失敗: {e}"))
        })?;
        let url = transfer_url(server_url, key_id);
        tracing::debug!("鍵ブローカーから鍵を取得中: {url}");
        let resp = post_with_retry(
            self.transport.as_ref(),
            &url,
            &TRANSFER_HEADERS,
            &body,
            &self.retry,
            cancel,
        )
        .await?;

        let (wrapped_key, wrapped_swk) = parse_transfer_response(&resp.body)?;

        // Step 4: SWKのアンラップ
        tracing::debug!("SWKをアンラップ中");
        let swk = keypair.unwrap_key(&wrapped_swk)?;
        drop(keypair);

        // Step 5: コンテンツ鍵の復号（SWKはここで一度だけ使う）
        let content_key = Zeroizing::new(decrypt_envelope(&wrapped_key, &swk)?);
        drop(swk);
        Ok(content_key)
    }
}

/// ブローカー応答から `(wrapped_key, wrapped_swk)` を取り出してデコードする。
fn parse_transfer_response(body: &[u8]) -> Result<(Vec<u8>, Vec<u8>), LoaderError> {
    let resp: TransferResponse = serde_json::from_slice(body)
        .map_err(|e| LoaderError::MalformedResponse(format!("JSONのパースに失敗: {e}")))?;

    let (Some(wrapped_key), Some(wrapped_swk)) = (resp.wrapped_key, resp.wrapped_swk) else {
        return Err(LoaderError::MalformedResponse(
            "wrapped_key と wrapped_swk の両方が必要です".to_string(),
        ));
    };

    let decode = |field: &str, value: &str| {
        b64()
            .decode(value)
            .map_err(|e| LoaderError::MalformedResponse(format!("{field}のBase64デコードに失敗: {e}")))
    };
    Ok((decode("wrapped_key", &wrapped_key)?, decode("wrapped_swk", &wrapped_swk)?))
}

impl KeyBrokerClient for AmberKeyBrokerClient {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Amber
    }

    fn get_key<'a>(
        &'a self,
        server_url: &'a str,
        key_id: &'a str,
        options: &'a CallOptions,
    ) -> KeyFuture<'a> {
        Box::pin(async move {
            if server_url.trim().is_empty() {
                return Err(LoaderError::InvalidArgument(
                    "KBSのURLが指定されていません".to_string(),
                ));
            }
            if key_id.trim().is_empty() {
                return Err(LoaderError::InvalidArgument(
                    "KBSの鍵IDが指定されていません".to_string(),
                ));
            }

            let exchange = self.exchange(server_url, key_id, &options.cancel);
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| LoaderError::Timeout)?,
                None => exchange.await,
            }
        })
    }
}
