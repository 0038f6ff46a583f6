//! # 暗号化エンベロープ
//!
//! 鍵ブローカーの `wrapped_key` と暗号化モデルバイナリは同じ自己記述型の
//! コンテナ形式を使う。
//!
//! ```text
//!  ------------------------------------------------------------------
//! | 12 bytes header | [12] bytes IV | encrypted data | [16] bytes tag |
//!  ------------------------------------------------------------------
//! header:
//!  ---------------------------------------------------------
//! | u32 LE IV length | u32 LE tag length | u32 LE data length |
//!  ---------------------------------------------------------
//! ```
//!
//! 暗号文の範囲は全長からヘッダー・IV・タグを差し引いて求める。
//! `data_len` はその長さとの一致を検証し、不一致はデコードエラーとする。

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use rand::RngCore;

use crate::CryptoError;

/// AES-192-GCM（IV 12バイト）。
type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

/// ヘッダー長（u32 × 3）
pub const HEADER_LEN: usize = 12;

/// AES-GCMのIV長
pub const IV_LEN: usize = 12;

/// AES-GCMの認証タグ長
pub const TAG_LEN: usize = 16;

/// エンベロープの固定長ヘッダー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub iv_len: u32,
    pub tag_len: u32,
    pub data_len: u32,
}

impl EnvelopeHeader {
    /// 先頭12バイトをリトルエンディアンの `u32` × 3 として読む。
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_LEN {
            return Err(CryptoError::EnvelopeDecode(format!(
                "ヘッダーには{HEADER_LEN}バイト必要ですが{}バイトしかありません",
                bytes.len()
            )));
        }
        let word = |i: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(buf)
        };
        Ok(Self {
            iv_len: word(0),
            tag_len: word(1),
            data_len: word(2),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.iv_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag_len.to_le_bytes());
        out[8..12].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }
}

/// パース済みエンベロープ。各スライスは入力バッファを借用する。
#[derive(Debug)]
pub struct Envelope<'a> {
    pub header: EnvelopeHeader,
    pub iv: &'a [u8],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// ヘッダーを読み、IV・暗号文・タグに分割する。
    ///
    /// IV長が12、タグ長が16でない場合、全長が足りない場合、
    /// `data_len` が暗号文長と一致しない場合はエラー。
    pub fn parse(bytes: &'a [u8]) -> Result<Self, CryptoError> {
        let header = EnvelopeHeader::parse(bytes)?;
        let iv_len = header.iv_len as usize;
        let tag_len = header.tag_len as usize;

        if iv_len != IV_LEN {
            return Err(CryptoError::EnvelopeDecode(format!(
                "IV長は{IV_LEN}バイトである必要があります（ヘッダー値: {iv_len}）"
            )));
        }
        if tag_len != TAG_LEN {
            return Err(CryptoError::EnvelopeDecode(format!(
                "タグ長は{TAG_LEN}バイトである必要があります（ヘッダー値: {tag_len}）"
            )));
        }

        let iv_end = HEADER_LEN + iv_len;
        let min_len = iv_end + tag_len;
        if bytes.len() < min_len {
            return Err(CryptoError::EnvelopeDecode(format!(
                "エンベロープ長が不足しています（{}バイト、最低{min_len}バイト）",
                bytes.len()
            )));
        }

        let tag_start = bytes.len() - tag_len;
        let iv = &bytes[HEADER_LEN..iv_end];
        let ciphertext = &bytes[iv_end..tag_start];
        let tag = &bytes[tag_start..];

        if header.data_len as usize != ciphertext.len() {
            return Err(CryptoError::EnvelopeDecode(format!(
                "data_len（{}）が暗号文長（{}）と一致しません",
                header.data_len,
                ciphertext.len()
            )));
        }

        Ok(Self {
            header,
            iv,
            ciphertext,
            tag,
        })
    }
}

/// エンベロープをAES-GCMで復号する。
///
/// 鍵長（16/24/32バイト）に応じてAES-128/192/256を選択する。
/// 認証タグが一致しない場合は [`CryptoError::AuthenticationFailure`]。
pub fn decrypt_envelope(envelope: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "暗号化データが空です".to_string(),
        ));
    }
    if key.is_empty() {
        return Err(CryptoError::InvalidArgument("復号鍵が空です".to_string()));
    }

    let parsed = Envelope::parse(envelope)?;
    let mut buffer = parsed.ciphertext.to_vec();
    match key.len() {
        16 => open_in_place::<Aes128Gcm>(key, parsed.iv, &mut buffer, parsed.tag)?,
        24 => open_in_place::<Aes192Gcm>(key, parsed.iv, &mut buffer, parsed.tag)?,
        32 => open_in_place::<Aes256Gcm>(key, parsed.iv, &mut buffer, parsed.tag)?,
        other => return Err(unsupported_key_len(other)),
    }
    Ok(buffer)
}

/// 平文をエンベロープ形式に暗号化する（暗号化側のツール・テスト用）。
///
/// IVは毎回OSの乱数源から生成する。
pub fn seal_envelope(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let data_len = u32::try_from(plaintext.len()).map_err(|_| {
        CryptoError::InvalidArgument("平文が4GiBを超えています".to_string())
    })?;

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let tag = match key.len() {
        16 => seal_in_place::<Aes128Gcm>(key, &iv, &mut buffer)?,
        24 => seal_in_place::<Aes192Gcm>(key, &iv, &mut buffer)?,
        32 => seal_in_place::<Aes256Gcm>(key, &iv, &mut buffer)?,
        other => return Err(unsupported_key_len(other)),
    };

    let header = EnvelopeHeader {
        iv_len: IV_LEN as u32,
        tag_len: TAG_LEN as u32,
        data_len,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + IV_LEN + buffer.len() + TAG_LEN);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buffer);
    out.extend_from_slice(&tag);
    Ok(out)
}

fn unsupported_key_len(len: usize) -> CryptoError {
    CryptoError::InvalidArgument(format!(
        "AES-GCMの鍵長は16/24/32バイトのいずれかです（{len}バイト）"
    ))
}

fn open_in_place<C>(key: &[u8], iv: &[u8], buffer: &mut [u8], tag: &[u8]) -> Result<(), CryptoError>
where
    C: KeyInit + AeadInPlace<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| unsupported_key_len(key.len()))?;
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            &[],
            buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailure)
}

fn seal_in_place<C>(key: &[u8], iv: &[u8; IV_LEN], buffer: &mut [u8]) -> Result<Vec<u8>, CryptoError>
where
    C: KeyInit + AeadInPlace<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| unsupported_key_len(key.len()))?;
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), &[], buffer)
        .map_err(|_| CryptoError::EncryptError)?;
    Ok(tag.to_vec())
}
