//! # ローダー設定
//!
//! CLI引数・環境変数から組み立てる設定値と、鍵取得1回ごとの呼び出し
//! オプションの定義。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LoaderError;

// ---------------------------------------------------------------------------
// デフォルト値
// ---------------------------------------------------------------------------

/// ステージング先ディレクトリ。メモリ上にマウントされている前提。
pub const DEFAULT_MODEL_DIR: &str = "/tmp";

/// メタデータ・モデル取得と鍵転送の各HTTPリクエストのタイムアウト（秒）
pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 10;

/// 鍵転送の最大試行回数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 最初のリトライまでの待機時間（ミリ秒）
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 200;

/// リトライ待機時間の上限（ミリ秒）
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// リトライポリシー
// ---------------------------------------------------------------------------

/// 鍵転送のリトライポリシー。接続レベルの失敗にのみ適用する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む）
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 試行ごとの待機時間の倍率
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// 待機なしで即時リトライするポリシー。
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// `attempt` 回目（1始まり）の失敗後に待つ時間。
    ///
    /// `initial_backoff * multiplier^(attempt-1)` を `max_backoff` で頭打ちにする。
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exp);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

/// 鍵ブローカー・モデルサーバーへのTLS設定。
///
/// 証明書検証は常に有効。信頼するCAを追加でき、組み込みルートを
/// 無効化すれば追加したCAのみを信頼する（ピン留め）。
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// 追加の信頼済みCA証明書（PEM）のパス
    pub extra_ca_pem: Vec<PathBuf>,
    /// `true` の場合、組み込みのルート証明書を信頼しない
    pub disable_builtin_roots: bool,
}

// ---------------------------------------------------------------------------
// Attestationランタイム選択
// ---------------------------------------------------------------------------

/// Evidence取得に使うランタイム。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// ローカル開発・テスト用（TEEハードウェア不要）
    Mock,
    /// Intel TDX（configfs-tsm経由）
    Tdx,
}

impl FromStr for RuntimeKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(RuntimeKind::Mock),
            "tdx" => Ok(RuntimeKind::Tdx),
            other => Err(LoaderError::InvalidArgument(format!(
                "未対応のAttestationランタイム: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// 設定本体
// ---------------------------------------------------------------------------

/// モデルローダーの設定。
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// モデルメタデータサーバーのベースURL
    pub model_info_url: String,
    /// 平文モデルのステージング先
    pub model_dir: PathBuf,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub tls: TlsConfig,
    pub runtime: RuntimeKind,
    /// 鍵取得1回あたりの全体タイムアウト（Noneなら無制限）
    pub key_timeout: Option<Duration>,
}

impl LoaderConfig {
    /// デフォルト値で設定を作成する。
    pub fn new(model_info_url: impl Into<String>) -> Self {
        Self {
            model_info_url: model_info_url.into(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SEC),
            retry: RetryPolicy::default(),
            tls: TlsConfig::default(),
            runtime: RuntimeKind::Tdx,
            key_timeout: None,
        }
    }
}

/// 鍵取得1回分の呼び出しオプション。
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// 全体のタイムアウト。超過時は試行中のリクエストも破棄する。
    pub timeout: Option<Duration>,
    /// キャンセル時は試行中のリクエストを中断し、以降リトライしない。
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: CancellationToken::new(),
        }
    }
}
