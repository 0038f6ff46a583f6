//! # インフラストラクチャモジュール
//!
//! 外部通信とファイルシステムに関するモジュール。
//! - `http_client`: reqwestクライアントの構築とGET/POST
//! - `staging`: 平文モデルのアトミックなステージング

pub mod http_client;
pub mod staging;
