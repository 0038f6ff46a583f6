//! # モデルのステージング
//!
//! 平文モデルを同じディレクトリ内の一時ファイルに書き切ってから
//! リネームで配置する。復号や書き込みの途中で失敗しても、
//! ステージング先に壊れたファイルは残らない。

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LoaderError;

/// 暗号化モデルのファイル名サフィックス
const ENCRYPTED_SUFFIX: &str = ".enc";

/// モデルURLからステージング用のファイル名を求める。
///
/// URLパスの最終セグメントから `.enc` サフィックスを除いたもの。
/// 例: `http://host/tensorflow/ssdmobilenet_v10.pb.enc` → `ssdmobilenet_v10.pb`
pub fn staged_file_name(model_url: &str) -> Result<String, LoaderError> {
    let url = reqwest::Url::parse(model_url)
        .map_err(|e| LoaderError::Validation(format!("モデルURLが不正です ({model_url}): {e}")))?;
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let name = last.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(last).trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(LoaderError::Validation(format!(
            "モデルURLからファイル名を決定できません: {model_url}"
        )));
    }
    Ok(name.to_string())
}

/// `data` を `dir/file_name` にアトミックに書き込む。
pub fn stage(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, LoaderError> {
    let target = dir.join(file_name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        LoaderError::Staging(format!("一時ファイルを作成できません ({}): {e}", dir.display()))
    })?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| LoaderError::Staging(format!("一時ファイルへの書き込みに失敗: {e}")))?;
    tmp.persist(&target).map_err(|e| {
        LoaderError::Staging(format!("{} への配置に失敗: {}", target.display(), e.error))
    })?;
    tracing::info!("モデルを {} に配置しました ({}バイト)", target.display(), data.len());
    Ok(target)
}
