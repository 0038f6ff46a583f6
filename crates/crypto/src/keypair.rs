//! # エフェメラルRSA鍵ペア
//!
//! 鍵転送1回ごとに生成するRSA鍵ペア。公開鍵はAttestation Evidenceに
//! 束縛してブローカーへ送り、秘密鍵はブローカーが返す `wrapped_swk` の
//! アンラップにのみ使う。秘密鍵はディスクにもログにも出さない。
//!
//! `rsa::RsaPrivateKey` はドロップ時に自身をゼロクリアする。

use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{sha256, CryptoError, SecretBytes};

/// 最小（かつデフォルト）のモジュラス長
pub const MIN_RSA_KEY_BITS: usize = 3072;

/// 公開指数
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// 1回の鍵転送に閉じたRSA鍵ペア。
pub struct EphemeralKeyPair {
    private_key: RsaPrivateKey,
    /// DERエンコードされたSubjectPublicKeyInfo
    public_key_der: Vec<u8>,
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

impl EphemeralKeyPair {
    /// 3072bitの鍵ペアを生成する。
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(MIN_RSA_KEY_BITS)
    }

    /// モジュラス長を指定して鍵ペアを生成する。3072bit未満は拒否する。
    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::InvalidArgument(format!(
                "RSA鍵長は{MIN_RSA_KEY_BITS}bit以上が必要です（{bits}bit）"
            )));
        }
        let exponent = rsa::BigUint::from(RSA_PUBLIC_EXPONENT);
        let private_key = RsaPrivateKey::new_with_exp(&mut rand::rngs::OsRng, bits, &exponent)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_key_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            private_key,
            public_key_der,
        })
    }

    /// DERエンコードされた公開鍵（SubjectPublicKeyInfo）。
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// 公開鍵DERのSHA-256（hex）。ログ出力用。
    pub fn fingerprint(&self) -> String {
        hex::encode(sha256(&self.public_key_der))
    }

    /// RSA-OAEP（SHA-256 / MGF1-SHA-256, ラベルなし）でラップされた鍵を復元する。
    ///
    /// 鍵違い・改ざん・鍵長に合わない長さはすべて [`CryptoError::UnwrapError`]。
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SecretBytes, CryptoError> {
        self.private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::UnwrapError)
    }
}

/// 公開鍵DERに対してRSA-OAEP（SHA-256）で鍵をラップする。
///
/// ブローカー側の処理に相当する。ツール・テスト用。
pub fn wrap_key(public_key_der: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public_key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::PublicKey(e.to_string()))?;
    public_key
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), key)
        .map_err(|e| CryptoError::WrapError(e.to_string()))
}
