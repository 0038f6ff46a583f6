//! # 鍵ブローカークライアント
//!
//! Attestation Evidenceと引き換えにモデル復号鍵を取得する。
//! ブローカーの種類ごとの差異は [`KeyBrokerClient`] トレイトの背後に隠し、
//! 呼び出し側は [`BrokerKind`] で実装を選ぶだけにする。
//!
//! ## 対応ブローカー
//!
//! | `kbs` | 実装 | プロトコル |
//! |-------|------|----------|
//! | `amber` | [`amber::AmberKeyBrokerClient`] | `POST {url}/keys/{key_id}/transfer`（TDX Quote + RSA公開鍵） |

pub mod amber;
pub mod retry;
pub mod transport;


use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use cnap_crypto::SecretBytes;

use crate::config::{CallOptions, RetryPolicy};
use crate::error::LoaderError;
use crate::runtime::EvidenceProvider;
use transport::TransferTransport;

/// 鍵ブローカー種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    Amber,
}

impl FromStr for BrokerKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amber" => Ok(BrokerKind::Amber),
            other => Err(LoaderError::UnsupportedBrokerType(other.to_string())),
        }
    }
}

/// `get_key` の戻り値の型。
pub type KeyFuture<'a> = Pin<Box<dyn Future<Output = Result<SecretBytes, LoaderError>> + Send + 'a>>;

/// 鍵ブローカーからコンテンツ鍵を取得するトレイト。
pub trait KeyBrokerClient: Send + Sync {
    fn kind(&self) -> BrokerKind;

    /// `key_id` のコンテンツ鍵を取得する。
    ///
    /// 1回の呼び出しに閉じた鍵ペアでEvidenceを取得し、ブローカーから
    /// ラップ済み鍵を受け取って復元する。キャッシュはしない。
    fn get_key<'a>(
        &'a self,
        server_url: &'a str,
        key_id: &'a str,
        options: &'a CallOptions,
    ) -> KeyFuture<'a>;
}

/// 鍵ブローカークライアントの生成に必要な共有部品。
#[derive(Clone)]
pub struct KeyBrokerFactory {
    pub evidence: Arc<dyn EvidenceProvider>,
    pub transport: Arc<dyn TransferTransport>,
    pub retry: RetryPolicy,
}

impl KeyBrokerFactory {
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

    /// 種別に応じたクライアントを生成する。
    pub fn client_for(&self, kind: BrokerKind) -> Box<dyn KeyBrokerClient> {
        match kind {
            BrokerKind::Amber => Box::new(amber::AmberKeyBrokerClient::new(
                self.evidence.clone(),
                self.transport.clone(),
                self.retry.clone(),
            )),
        }
    }
}
