//! # ローカル開発用モックランタイム
//!
//! TEEハードウェアが利用できない開発環境で使用するモック実装。
//! TDX Quoteの代わりに、REPORTDATAを埋め込んだJSONドキュメントを返す。
//! 測定値（MRTD, RTMR0〜3）は全てゼロ（debug TDと同等）。

use super::{report_data, EvidenceProvider};
use crate::error::LoaderError;

/// モックEvidenceの構造体。
#[derive(serde::Serialize, serde::Deserialize)]
pub struct MockEvidence {
    /// モジュールID
    pub module_id: String,
    /// MRTD（TDイメージ測定値）。全ゼロ（48バイト）
    pub mrtd: Vec<u8>,
    /// RTMR0〜3。全ゼロ（各48バイト）
    pub rtmrs: Vec<Vec<u8>>,
    /// hex(SHA-512(binding_data))
    pub report_data: String,
}

/// モックランタイム。ローカル開発・テスト用。
pub struct MockEvidenceProvider {
    module_id: String,
}

impl MockEvidenceProvider {
    pub fn new() -> Self {
        Self {
            module_id: "mock-td".to_string(),
        }
    }
}

impl Default for MockEvidenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceProvider for MockEvidenceProvider {
    fn tee_type(&self) -> &str {
        "mock"
    }

    fn get_evidence(&self, binding_data: &[u8]) -> Result<Vec<u8>, LoaderError> {
        if binding_data.is_empty() {
            return Err(LoaderError::EvidenceUnavailable(
                "binding_dataが空です".to_string(),
            ));
        }
        let doc = MockEvidence {
            module_id: self.module_id.clone(),
            mrtd: vec![0u8; 48],
            rtmrs: vec![vec![0u8; 48]; 4],
            report_data: hex::encode(report_data(binding_data)),
        };
        serde_json::to_vec(&doc).map_err(|e| {
            LoaderError::EvidenceUnavailable(format!("モックEvidenceのシリアライズに失敗: {e}"))
        })
    }
}
