//! # CNAP 暗号処理
//!
//! 鍵ブローカーから受け取ったラップ済み鍵の復元と、暗号化モデルの復号を行う。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | エフェメラル鍵ペア | RSA 3072bit, e = 65537 |
//! | SWKのアンラップ | RSA-OAEP (SHA-256 / MGF1-SHA-256, ラベルなし) |
//! | 対称暗号 | AES-GCM (128/192/256, IV 12バイト, タグ 16バイト) |
//! | フィンガープリント | SHA-256 |
//!
//! 秘密鍵・SWK・コンテンツ鍵は全てドロップ時にゼロクリアされるコンテナで扱う。

pub mod envelope;
pub mod keypair;

use sha2::{Digest, Sha256};

pub use envelope::{decrypt_envelope, seal_envelope, Envelope, EnvelopeHeader};
pub use keypair::{wrap_key, EphemeralKeyPair};
pub use zeroize::Zeroizing;

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// 空の入力や未対応の鍵長
    #[error("不正な引数: {0}")]
    InvalidArgument(String),
    /// 鍵ペア生成の失敗（乱数源・アルゴリズムの初期化失敗）
    #[error("鍵ペアの生成に失敗しました: {0}")]
    KeyGeneration(String),
    /// 公開鍵DERのエンコード・デコード失敗
    #[error("公開鍵の処理に失敗しました: {0}")]
    PublicKey(String),
    /// エンベロープのヘッダー・長さが不正
    #[error("エンベロープのデコードに失敗しました: {0}")]
    EnvelopeDecode(String),
    /// AES-GCMの認証タグ検証失敗
    #[error("AES-GCMの認証タグ検証に失敗しました")]
    AuthenticationFailure,
    /// AES-GCM暗号化エラー
    #[error("AES-GCM暗号化に失敗しました")]
    EncryptError,
    /// RSA-OAEPによる鍵アンラップの失敗
    #[error("RSA-OAEPによる鍵のアンラップに失敗しました")]
    UnwrapError,
    /// RSA-OAEPによる鍵ラップの失敗
    #[error("RSA-OAEPによる鍵のラップに失敗しました: {0}")]
    WrapError(String),
}

/// ドロップ時にゼロクリアされる鍵バッファ。
pub type SecretBytes = Zeroizing<Vec<u8>>;

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
