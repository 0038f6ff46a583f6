//! # シンプルモデルプロバイダ
//!
//! HTTPのメタデータサーバーからモデル情報を取得し、`url` からモデルを
//! ダウンロードする。`encrypted == true` の場合は鍵ブローカーから
//! コンテンツ鍵を取得して復号してからステージングする。
//!
//! ```text
//! GET {model_info_url}/{model_id}
//!     Accept: application/json
//!     Content-Type: application/json
//! → {"id": "...", "url": "http://host/tensorflow/ssdmobilenet_v10.pb.enc",
//!    "name": "ssdmobilenet", "version": "1.0", "framework": "tensorflow",
//!    "target": "object-detection", "dtype": "int8", "encrypted": true,
//!    "kbs": "amber", "kbs_url": "https://kbs.local", "key_id": "..."}
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use cnap_crypto::{decrypt_envelope, SecretBytes};
use cnap_types::{ModelDetails, ModelInfo, ModelMetadata, ModelMetrics};

use super::{ModelProvider, ProviderFuture, ProviderParams};
use crate::config::CallOptions;
use crate::error::LoaderError;
use crate::infra::http_client::{self, JSON_HEADERS};
use crate::infra::staging::{stage, staged_file_name};
use crate::keybroker::{BrokerKind, KeyBrokerFactory};

/// 空白のみの値も未指定として扱う。
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 暗号化モデルの鍵の所在。
struct KeyLocation<'m> {
    kind: BrokerKind,
    kbs_url: &'m str,
    key_id: &'m str,
}

impl<'m> KeyLocation<'m> {
    fn from_metadata(meta: &'m ModelMetadata) -> Result<Self, LoaderError> {
        let required = |name: &str, value: &'m Option<String>| {
            non_empty(value).ok_or_else(|| {
                LoaderError::InvalidArgument(format!("暗号化モデルには {name} が必要です"))
            })
        };
        let kbs = required("kbs", &meta.kbs)?;
        let kbs_url = required("kbs_url", &meta.kbs_url)?;
        let key_id = required("key_id", &meta.key_id)?;
        Ok(Self {
            kind: kbs.parse()?,
            kbs_url,
            key_id,
        })
    }
}

/// HTTPメタデータサーバーを使うモデルプロバイダ。
pub struct SimpleModelProvider {
    model_info_url: String,
    model_id: String,
    model_dir: PathBuf,
    client: reqwest::Client,
    keys: KeyBrokerFactory,
    /// 取得済みの平文モデル
    model_data: Mutex<Option<Vec<u8>>>,
}

impl SimpleModelProvider {
    pub fn new(params: ProviderParams) -> Result<Self, LoaderError> {
        if params.model_info_url.trim().is_empty() {
            return Err(LoaderError::InvalidArgument(
                "モデル情報サーバーのURLが指定されていません".to_string(),
            ));
        }
        if params.model_id.trim().is_empty() {
            return Err(LoaderError::InvalidArgument(
                "モデルIDが指定されていません".to_string(),
            ));
        }
        Ok(Self {
            model_info_url: params.model_info_url,
            model_id: params.model_id,
            model_dir: params.model_dir,
            client: params.client,
            keys: params.keys,
            model_data: Mutex::new(None),
        })
    }

    fn cached_data(&self) -> Option<Vec<u8>> {
        self.model_data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn fetch_metadata(&self) -> Result<ModelMetadata, LoaderError> {
        let url = format!(
            "{}/{}",
            self.model_info_url.trim_end_matches('/'),
            self.model_id
        );
        tracing::debug!("モデル情報を取得中: {url}");
        let resp = http_client::get(&self.client, &url, &JSON_HEADERS)
            .await
            .map_err(|e| LoaderError::Connection(format!("{url}: {}", e.without_url())))?;
        if resp.status != 200 {
            return Err(LoaderError::Connection(format!(
                "モデル情報サーバーがステータス {} を返しました ({url})",
                resp.status
            )));
        }
        serde_json::from_slice(&resp.body)
            .map_err(|e| LoaderError::Validation(format!("モデル情報のパースに失敗: {e}")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, LoaderError> {
        tracing::info!("モデルをダウンロード中: {url}");
        let resp = http_client::get(&self.client, url, &[])
            .await
            .map_err(|e| LoaderError::Connection(format!("{url}: {}", e.without_url())))?;
        if resp.status != 200 {
            return Err(LoaderError::Connection(format!(
                "モデルのダウンロードに失敗 (ステータス {}, {url})",
                resp.status
            )));
        }
        Ok(resp.body)
    }

    async fn content_key(
        &self,
        location: &KeyLocation<'_>,
        options: &CallOptions,
    ) -> Result<SecretBytes, LoaderError> {
        let broker = self.keys.client_for(location.kind);
        broker
            .get_key(location.kbs_url, location.key_id, options)
            .await
    }

    async fn retrieve(&self, options: &CallOptions) -> Result<ModelInfo, LoaderError> {
        let meta = self.fetch_metadata().await?;
        let (Some(id), Some(model_url)) = (non_empty(&meta.id), non_empty(&meta.url)) else {
            return Err(LoaderError::Validation(
                "モデル情報には id と url が必要です".to_string(),
            ));
        };
        let file_name = staged_file_name(model_url)?;
        let location = if meta.encrypted {
            Some(KeyLocation::from_metadata(&meta)?)
        } else {
            None
        };

        let raw = self.download(model_url).await?;

        let plaintext = match location {
            Some(location) => {
                let key = self.content_key(&location, options).await?;
                tracing::debug!("モデルを復号中 ({}バイト)", raw.len());
                tokio::task::spawn_blocking(move || decrypt_envelope(&raw, &key))
                    .await
                    .map_err(|e| LoaderError::Decryption(format!("復号タスクが異常終了: {e}")))??
            }
            None => raw,
        };

        let path = stage(&self.model_dir, &file_name, &plaintext)?;
        *self.model_data.lock().unwrap_or_else(|e| e.into_inner()) = Some(plaintext);

        Ok(ModelInfo {
            id: id.to_string(),
            path: path.to_string_lossy().into_owned(),
            details: ModelDetails::from(&meta),
            uploaded_date: 0,
            metrics: ModelMetrics::default(),
        })
    }
}

impl ModelProvider for SimpleModelProvider {
    fn get_model_info<'a>(&'a self, options: &'a CallOptions) -> ProviderFuture<'a, ModelInfo> {
        Box::pin(self.retrieve(options))
    }

    fn get_model_data<'a>(&'a self, options: &'a CallOptions) -> ProviderFuture<'a, Vec<u8>> {
        Box::pin(async move {
            if let Some(data) = self.cached_data() {
                return Ok(data);
            }
            self.retrieve(options).await?;
            self.cached_data().ok_or_else(|| {
                LoaderError::Staging("取得済みのモデルデータがありません".to_string())
            })
        })
    }
}
