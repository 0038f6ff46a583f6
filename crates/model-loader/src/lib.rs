//! # CNAP Model Loader
//!
//! TEE内のワークロードが、Attestation Evidenceと引き換えに鍵ブローカーから
//! モデル復号鍵を受け取り、暗号化モデルを復号して配置するローダー。
//!
//! ## 取得シーケンス
//! 1. メタデータサーバーからモデル情報を取得（`id`, `url` は必須）
//! 2. `url` からモデルをダウンロード
//! 3. `encrypted == true` の場合:
//!    エフェメラルRSA鍵 → Evidence → 鍵転送 → SWKアンラップ → コンテンツ鍵
//! 4. コンテンツ鍵でエンベロープを復号
//! 5. 一時ファイル経由でアトミックに `{model_dir}/{ファイル名}` へ配置

pub mod config;
pub mod error;
pub mod infra;
pub mod keybroker;
pub mod provider;
pub mod runtime;

#[cfg(test)]
mod test_helpers;

pub use config::{CallOptions, LoaderConfig, RetryPolicy, RuntimeKind, TlsConfig};
pub use error::LoaderError;
pub use keybroker::{BrokerKind, KeyBrokerClient, KeyBrokerFactory};
pub use provider::{ModelProvider, ProviderParams};
