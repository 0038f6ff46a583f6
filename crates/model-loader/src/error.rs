//! # ローダーエラー型
//!
//! 鍵取得・モデル取得の全経路で共通のエラー型。
//! どのエラーも現在の取得処理を終了させる（リトライ対象は鍵転送の
//! 接続レベル失敗のみで、それは `keybroker::retry` 内で吸収される）。

use cnap_crypto::CryptoError;

/// ローダーエラー型。
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// 必須の入力が欠けている・空である
    #[error("不正な引数: {0}")]
    InvalidArgument(String),
    /// エフェメラル鍵ペアの生成失敗
    #[error("暗号処理の初期化に失敗: {0}")]
    CryptoInit(String),
    /// Attestation Evidenceの取得失敗（TEE不在を含む）
    #[error("Attestation Evidenceを取得できません: {0}")]
    EvidenceUnavailable(String),
    /// 接続失敗のリトライ上限到達、または200以外のステータス
    #[error("鍵ブローカーに到達できません: {0}")]
    KeyBrokerUnreachable(String),
    /// ブローカー応答に必須フィールドがない・デコードできない
    #[error("鍵ブローカーの応答が不正です: {0}")]
    MalformedResponse(String),
    /// RSA-OAEPによるSWKのアンラップ失敗
    #[error("鍵のアンラップに失敗: {0}")]
    Decryption(String),
    /// AES-GCMの認証タグ不一致
    #[error("認証付き復号に失敗しました（タグ不一致）")]
    AuthenticationFailure,
    /// エンベロープのヘッダー・長さの不整合
    #[error("エンベロープが不正です: {0}")]
    EnvelopeDecode(String),
    /// 未対応の鍵ブローカー種別
    #[error("未対応の鍵ブローカー種別: {0}")]
    UnsupportedBrokerType(String),
    /// モデルメタデータに必須フィールドがない
    #[error("モデルメタデータが不正です: {0}")]
    Validation(String),
    /// メタデータ・モデルバイナリの取得失敗
    #[error("モデルサーバーへの接続に失敗: {0}")]
    Connection(String),
    /// 呼び出し単位のタイムアウト
    #[error("鍵取得がタイムアウトしました")]
    Timeout,
    /// キャンセルシグナルによる中断
    #[error("鍵取得がキャンセルされました")]
    Cancelled,
    /// ステージング先への書き込み失敗
    #[error("モデルのステージングに失敗: {0}")]
    Staging(String),
    /// 暗号化側（sealing）の失敗
    #[error("暗号化に失敗: {0}")]
    Sealing(String),
}

impl From<CryptoError> for LoaderError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidArgument(msg) => LoaderError::InvalidArgument(msg),
            CryptoError::KeyGeneration(msg) => LoaderError::CryptoInit(msg),
            CryptoError::EnvelopeDecode(msg) => LoaderError::EnvelopeDecode(msg),
            CryptoError::AuthenticationFailure => LoaderError::AuthenticationFailure,
            CryptoError::UnwrapError => LoaderError::Decryption(err.to_string()),
            CryptoError::PublicKey(_) | CryptoError::EncryptError | CryptoError::WrapError(_) => {
                LoaderError::Sealing(err.to_string())
            }
        }
    }
}
