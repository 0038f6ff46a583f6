//! # Attestationランタイム抽象化
//!
//! Attestation Evidence（Quote）の取得を抽象化するトレイト。
//! 鍵ブローカークライアントはこのトレイトだけに依存するため、
//! TEEハードウェアなしでもモックを注入して動かせる。
//!
//! 現在のランタイム実装:
//! - `mock`: ローカル開発・テスト用（JSON形式のモックEvidence）
//! - `tdx`: Intel TDX（configfs-tsm経由でQuoteを取得）

pub mod mock;
pub mod tdx;

use std::sync::Arc;

use sha2::{Digest, Sha512};

use crate::config::RuntimeKind;
use crate::error::LoaderError;

/// TDX REPORTDATAの長さ
pub const REPORT_DATA_LEN: usize = 64;

/// Attestation Evidenceを生成するランタイムのトレイト。
pub trait EvidenceProvider: Send + Sync {
    /// TEE種別（ログ出力用）。
    fn tee_type(&self) -> &str;

    /// `binding_data` に暗号学的に束縛されたEvidenceを取得する。
    ///
    /// `binding_data` はエフェメラル公開鍵DERのBase64文字列。
    /// TEEが存在しない場合や生成に失敗した場合は
    /// [`LoaderError::EvidenceUnavailable`]。
    fn get_evidence(&self, binding_data: &[u8]) -> Result<Vec<u8>, LoaderError>;
}

/// `binding_data` からTDX REPORTDATA（64バイト）を導出する。
///
/// `REPORTDATA = SHA-512(binding_data)`
pub fn report_data(binding_data: &[u8]) -> [u8; REPORT_DATA_LEN] {
    let digest = Sha512::digest(binding_data);
    let mut out = [0u8; REPORT_DATA_LEN];
    out.copy_from_slice(&digest);
    out
}

/// 設定に応じたランタイムを生成する。
pub fn provider_for(kind: RuntimeKind) -> Arc<dyn EvidenceProvider> {
    match kind {
        RuntimeKind::Mock => {
            tracing::info!("MockEvidenceProviderで起動します");
            Arc::new(mock::MockEvidenceProvider::new())
        }
        RuntimeKind::Tdx => {
            tracing::info!("TdxEvidenceProviderで起動します");
            Arc::new(tdx::TdxEvidenceProvider::new())
        }
    }
}
