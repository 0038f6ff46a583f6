//! # モデルプロバイダ
//!
//! モデルのメタデータ取得・ダウンロード・（必要なら）復号・ステージングを
//! まとめて行う実装を抽象化する。
//!
//! ## プロバイダ実装
//! - `simple`: HTTPのメタデータサーバーとモデルサーバーから取得する

pub mod simple;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use cnap_types::ModelInfo;

use crate::config::{CallOptions, LoaderConfig};
use crate::error::LoaderError;
use crate::infra::http_client::build_client;
use crate::keybroker::transport::ReqwestTransport;
use crate::keybroker::KeyBrokerFactory;
use crate::runtime;

/// プロバイダ操作の戻り値の型。
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LoaderError>> + Send + 'a>>;

/// モデルを取得するトレイト。
pub trait ModelProvider: Send + Sync {
    /// モデルを取得・展開し、ステージング済みファイルの情報を返す。
    fn get_model_info<'a>(&'a self, options: &'a CallOptions) -> ProviderFuture<'a, ModelInfo>;

    /// 平文のモデルデータを返す。未取得なら [`ModelProvider::get_model_info`] を先に行う。
    fn get_model_data<'a>(&'a self, options: &'a CallOptions) -> ProviderFuture<'a, Vec<u8>>;
}

/// プロバイダの生成に必要なパラメータ。
pub struct ProviderParams {
    /// メタデータサーバーのURL
    pub model_info_url: String,
    pub model_id: String,
    /// ステージング先ディレクトリ
    pub model_dir: PathBuf,
    pub client: reqwest::Client,
    pub keys: KeyBrokerFactory,
}

/// 名前からプロバイダを生成する。未知の名前は [`LoaderError::InvalidArgument`]。
pub fn provider_for(name: &str, params: ProviderParams) -> Result<Box<dyn ModelProvider>, LoaderError> {
    match name {
        "simple" => Ok(Box::new(simple::SimpleModelProvider::new(params)?)),
        other => Err(LoaderError::InvalidArgument(format!(
            "未知のモデルプロバイダ: {other}"
        ))),
    }
}

/// 設定からHTTPクライアント・ランタイム・鍵ブローカーを組み立て、プロバイダを生成する。
pub fn from_config(
    name: &str,
    model_id: &str,
    config: &LoaderConfig,
) -> Result<Box<dyn ModelProvider>, LoaderError> {
    let client = build_client(config.http_timeout, &config.tls)?;
    let keys = KeyBrokerFactory::new(
        runtime::provider_for(config.runtime),
        Arc::new(ReqwestTransport::new(client.clone())),
        config.retry.clone(),
    );
    provider_for(
        name,
        ProviderParams {
            model_info_url: config.model_info_url.clone(),
            model_id: model_id.to_string(),
            model_dir: config.model_dir.clone(),
            client,
            keys,
        },
    )
}
