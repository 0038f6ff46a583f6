//! # CNAP 共有型定義
//!
//! 鍵ブローカー（KBS）とのワイヤ形式、およびモデルメタデータサーバーの
//! レスポンスをRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64 (Standard, パディングあり): Quote、公開鍵DER、ラップ済み鍵

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 鍵転送 API (POST {kbs_url}/keys/{key_id}/transfer)
// ---------------------------------------------------------------------------

/// 鍵転送リクエスト。
///
/// リトライ時も同一の値をそのまま再送する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Base64エンコードされたAttestation Evidence（TDX Quote）
    pub quote: String,
    /// Base64エンコードされたエフェメラル公開鍵（DER SubjectPublicKeyInfo）
    pub user_data: String,
}

/// 鍵転送レスポンス（HTTP 200時のボディ）。
///
/// 両フィールドともブローカーが省略し得るため `Option` で受け、
/// 欠落の判定は呼び出し側で行う。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferResponse {
    /// SWKで暗号化されたコンテンツ鍵（エンベロープ形式、Base64）
    #[serde(default)]
    pub wrapped_key: Option<String>,
    /// エフェメラル公開鍵でRSA-OAEPラップされたSWK（Base64）
    #[serde(default)]
    pub wrapped_swk: Option<String>,
}

// ---------------------------------------------------------------------------
// モデルメタデータ (GET {model_info_url}/{model_id})
// ---------------------------------------------------------------------------

/// モデルメタデータサーバーのレスポンス。
///
/// 全フィールドが省略可能。`id` と `url` の必須チェックは取得側で行う。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// モデルID（UUID文字列）
    #[serde(default)]
    pub id: Option<String>,
    /// モデルバイナリのダウンロードURL
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// 学習フレームワーク（例: "tensorflow"）
    #[serde(default)]
    pub framework: Option<String>,
    /// 推論ターゲット（例: "object-detection"）
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub dtype: Option<String>,
    /// バイナリがエンベロープ形式で暗号化されているか
    #[serde(default)]
    pub encrypted: bool,
    /// 鍵ブローカー種別（現在は `"amber"` のみ）
    #[serde(default)]
    pub kbs: Option<String>,
    /// 鍵ブローカーのベースURL
    #[serde(default)]
    pub kbs_url: Option<String>,
    /// ブローカー上の鍵ID
    #[serde(default)]
    pub key_id: Option<String>,
}

// ---------------------------------------------------------------------------
// モデル情報
// ---------------------------------------------------------------------------

/// モデルの詳細情報。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub name: Option<String>,
    pub version: Option<String>,
    pub framework: Option<String>,
    pub target: Option<String>,
    pub dtype: Option<String>,
}

impl From<&ModelMetadata> for ModelDetails {
    fn from(meta: &ModelMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.clone(),
            framework: meta.framework.clone(),
            target: meta.target.clone(),
            dtype: meta.dtype.clone(),
        }
    }
}

/// モデルの性能指標。取得直後は全てゼロ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub loss: f64,
}

/// 取得・展開済みモデルの情報。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// モデルID
    pub id: String,
    /// ステージング済みの平文モデルファイルのパス
    pub path: String,
    pub details: ModelDetails,
    /// アップロード日時（UNIXタイムスタンプ、不明な場合は0）
    pub uploaded_date: u64,
    pub metrics: ModelMetrics,
}
