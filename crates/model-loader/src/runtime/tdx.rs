//! # Intel TDX ランタイム実装
//!
//! TDゲスト上でLinuxカーネルの configfs-tsm インターフェースを使い、
//! TDX Quoteを取得する。
//!
//! ## 手順
//! 1. `/sys/kernel/config/tsm/report/<name>` を作成
//! 2. `provider` が `tdx_guest` であることを確認
//! 3. `inblob` に REPORTDATA（`SHA-512(binding_data)`、64バイト）を書き込む
//! 4. `outblob` からQuoteを読み出す
//! 5. `generation` が書き込み1回分だけ進んだことを確認（他プロセスとの競合検出）
//! 6. エントリを削除
//!
//! ## 設計
//!
//! configfs操作は `TsmOps` トレイトで抽象化し、テスト時にはモック注入が可能。
//! - 本番: `RealTsm`: `std::fs` 経由で configfs を操作
//! - テスト: `MockTsm`: カーネルの振る舞いをメモリ内で再現

use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;

use super::{report_data, EvidenceProvider};
use crate::error::LoaderError;

/// configfs-tsm のレポートディレクトリ
pub const TSM_REPORT_ROOT: &str = "/sys/kernel/config/tsm/report";

/// TDXゲストドライバのプロバイダ名
const TDX_PROVIDER: &str = "tdx_guest";

// ─────────────────────────────────────────────
// configfs操作の抽象化
// ─────────────────────────────────────────────

/// configfs-tsm操作の抽象化トレイト。
trait TsmOps: Send + Sync {
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// 本番用: configfsを直接操作する。
struct RealTsm;

impl TsmOps for RealTsm {
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }
}

/// レポートエントリ。ドロップ時にディレクトリを削除する。
struct ReportEntry<'a> {
    ops: &'a dyn TsmOps,
    path: PathBuf,
}

impl Drop for ReportEntry<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ops.remove_dir(&self.path) {
            tracing::warn!("configfs-tsmエントリの削除に失敗 ({}): {}", self.path.display(), e);
        }
    }
}

// ─────────────────────────────────────────────
// TdxEvidenceProvider本体
// ─────────────────────────────────────────────

/// Intel TDX ランタイム。
pub struct TdxEvidenceProvider {
    /// configfs操作（テスト時はモック注入可能）
    ops: Box<dyn TsmOps>,
    root: PathBuf,
}

impl TdxEvidenceProvider {
    /// 本番用。`/sys/kernel/config/tsm/report` を使う。
    pub fn new() -> Self {
        Self {
            ops: Box::new(RealTsm),
            root: PathBuf::from(TSM_REPORT_ROOT),
        }
    }

    #[cfg(test)]
    fn with_ops(ops: Box<dyn TsmOps>) -> Self {
        Self {
            ops,
            root: PathBuf::from(TSM_REPORT_ROOT),
        }
    }

    fn read_generation(&self, entry: &Path) -> Result<u64, LoaderError> {
        let raw = self
            .ops
            .read(&entry.join("generation"))
            .map_err(|e| unavailable("generationの読み出しに失敗", e))?;
        String::from_utf8_lossy(&raw)
            .trim()
            .parse::<u64>()
            .map_err(|e| LoaderError::EvidenceUnavailable(format!("generationが不正です: {e}")))
    }
}

impl Default for TdxEvidenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(context: &str, err: io::Error) -> LoaderError {
    LoaderError::EvidenceUnavailable(format!("{context}: {err}"))
}

impl EvidenceProvider for TdxEvidenceProvider {
    fn tee_type(&self) -> &str {
        "intel_tdx"
    }

    fn get_evidence(&self, binding_data: &[u8]) -> Result<Vec<u8>, LoaderError> {
        let mut suffix = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut suffix);
        let path = self.root.join(format!("cnap-{}", hex::encode(suffix)));

        self.ops.create_dir(&path).map_err(|e| {
            unavailable("configfs-tsmのレポートを作成できません（TDゲスト外で実行していませんか？）", e)
        })?;
        let entry = ReportEntry {
            ops: self.ops.as_ref(),
            path,
        };

        let provider = self
            .ops
            .read(&entry.path.join("provider"))
            .map_err(|e| unavailable("providerの読み出しに失敗", e))?;
        let provider = String::from_utf8_lossy(&provider).trim().to_string();
        if provider != TDX_PROVIDER {
            return Err(LoaderError::EvidenceUnavailable(format!(
                "TDXではないTSMプロバイダです: {provider}"
            )));
        }

        let before = self.read_generation(&entry.path)?;
        self.ops
            .write(&entry.path.join("inblob"), &report_data(binding_data))
            .map_err(|e| unavailable("inblobの書き込みに失敗", e))?;
        let quote = self
            .ops
            .read(&entry.path.join("outblob"))
            .map_err(|e| unavailable("outblobの読み出しに失敗", e))?;
        let after = self.read_generation(&entry.path)?;

        if after != before + 1 {
            return Err(LoaderError::EvidenceUnavailable(format!(
                "他のプロセスと競合しました（generation {before} → {after}）"
            )));
        }
        if quote.is_empty() {
            return Err(LoaderError::EvidenceUnavailable(
                "空のQuoteが返されました".to_string(),
            ));
        }

        tracing::debug!("TDX Quoteを取得しました ({}バイト)", quote.len());
        Ok(quote)
    }
}

// ─────────────────────────────────────────────
// モックconfigfs（テスト用）
// ─────────────────────────────────────────────

#[cfg(test)]
mod mock_tsm {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use super::TsmOps;

    /// カーネルのconfigfs-tsmの振る舞いを模したモック。
    ///
    /// - `inblob` への書き込みで `generation` が1進む
    /// - `outblob` は `"QUOTE" || inblob`
    #[derive(Clone, Default)]
    pub(super) struct MockTsm {
        pub state: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    pub(super) struct MockState {
        pub provider: String,
        pub dirs: Vec<PathBuf>,
        pub removed: Vec<PathBuf>,
        pub inblob: HashMap<PathBuf, Vec<u8>>,
        pub generation: u64,
        /// 書き込みのたびに追加で進めるgeneration（競合の再現用）
        pub racing_writes: u64,
        pub fail_create: bool,
    }

    impl MockTsm {
        pub fn tdx() -> Self {
            let tsm = Self::default();
            tsm.state.lock().unwrap().provider = "tdx_guest".to_string();
            tsm
        }
    }

    impl TsmOps for MockTsm {
        fn create_dir(&self, path: &Path) -> io::Result<()> {
            let mut st = self.state.lock().unwrap();
            if st.fail_create {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no configfs-tsm"));
            }
            st.dirs.push(path.to_path_buf());
            Ok(())
        }

        fn remove_dir(&self, path: &Path) -> io::Result<()> {
            let mut st = self.state.lock().unwrap();
            st.dirs.retain(|d| d != path);
            st.removed.push(path.to_path_buf());
            Ok(())
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            let st = self.state.lock().unwrap();
            let dir = path.parent().unwrap().to_path_buf();
            match path.file_name().and_then(|n| n.to_str()) {
                Some("provider") => Ok(format!("{}\n", st.provider).into_bytes()),
                Some("generation") => Ok(format!("{}\n", st.generation).into_bytes()),
                Some("outblob") => {
                    let mut quote = b"QUOTE".to_vec();
                    quote.extend_from_slice(st.inblob.get(&dir).map(Vec::as_slice).unwrap_or(&[]));
                    Ok(quote)
                }
                _ => Err(io::Error::new(io::ErrorKind::NotFound, "unknown attribute")),
            }
        }

        fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            let mut st = self.state.lock().unwrap();
            let dir = path.parent().unwrap().to_path_buf();
            st.inblob.insert(dir, data.to_vec());
            st.generation += 1 + st.racing_writes;
            Ok(())
        }
    }
}
