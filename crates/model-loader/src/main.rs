//! # cnap-model-loader
//!
//! ## サブコマンド
//! - `retrieve`: モデルを取得し、暗号化されていれば鍵ブローカー経由で復号して配置する
//! - `seal`: モデルファイルをエンベロープ形式に暗号化する（配布側の準備用）
//!
//! ログレベルは `RUST_LOG` で指定する（デフォルト `info`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cnap_model_loader::config::{
    DEFAULT_HTTP_TIMEOUT_SEC, DEFAULT_MAX_ATTEMPTS, DEFAULT_MODEL_DIR,
};
use cnap_model_loader::infra::staging::stage;
use cnap_model_loader::provider;
use cnap_model_loader::{CallOptions, LoaderConfig, RetryPolicy, RuntimeKind, TlsConfig};

#[derive(Parser)]
#[command(name = "cnap-model-loader", version, about = "Attested model loader for CNAP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a model, decrypt it with a key from the key broker and stage it
    Retrieve(RetrieveArgs),
    /// Encrypt a model file into the envelope format
    Seal {
        /// Plaintext model file
        #[arg(long)]
        input: PathBuf,
        /// Raw AES key file (16, 24 or 32 bytes)
        #[arg(long)]
        key_file: PathBuf,
        /// Output envelope file
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RetrieveArgs {
    /// Model metadata server URL
    #[arg(long, env = "CNAP_MODEL_INFO_URL")]
    model_info_url: String,
    /// Model id to fetch
    #[arg(long, env = "CNAP_MODEL_ID")]
    model_id: String,
    /// Model provider name
    #[arg(long, env = "CNAP_MODEL_PROVIDER", default_value = "simple")]
    provider: String,
    /// Directory the plaintext model is staged into
    #[arg(long, env = "CNAP_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,
    /// Attestation runtime (tdx, mock)
    #[arg(long, env = "CNAP_ATTESTATION", default_value = "tdx")]
    attestation: RuntimeKind,
    /// Timeout for each HTTP request in seconds
    #[arg(long, env = "CNAP_HTTP_TIMEOUT_SEC", default_value_t = DEFAULT_HTTP_TIMEOUT_SEC)]
    http_timeout_sec: u64,
    /// Overall timeout for the key retrieval in seconds
    #[arg(long, env = "CNAP_KEY_TIMEOUT_SEC")]
    key_timeout_sec: Option<u64>,
    /// Attempts for the key transfer request
    #[arg(long, env = "CNAP_KBS_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    /// Extra trusted CA certificates (PEM), comma separated
    #[arg(long, env = "CNAP_CA_CERT", value_delimiter = ',')]
    ca_cert: Vec<PathBuf>,
    /// Trust only the certificates given with --ca-cert
    #[arg(long, env = "CNAP_DISABLE_BUILTIN_ROOTS")]
    disable_builtin_roots: bool,
}

impl RetrieveArgs {
    fn to_config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::new(self.model_info_url.clone());
        config.model_dir = self.model_dir.clone();
        config.http_timeout = Duration::from_secs(self.http_timeout_sec);
        config.retry = RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        };
        config.tls = TlsConfig {
            extra_ca_pem: self.ca_cert.clone(),
            disable_builtin_roots: self.disable_builtin_roots,
        };
        config.runtime = self.attestation;
        config.key_timeout = self.key_timeout_sec.map(Duration::from_secs);
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Retrieve(args) => retrieve(args).await,
        Command::Seal {
            input,
            key_file,
            output,
        } => seal(&input, &key_file, &output),
    }
}

async fn retrieve(args: RetrieveArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    let provider = provider::from_config(&args.provider, &args.model_id, &config)?;

    let options = CallOptions {
        timeout: config.key_timeout,
        ..CallOptions::default()
    };
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("中断シグナルを受信しました");
            cancel.cancel();
        }
    });

    tracing::info!("モデル {} を取得します", args.model_id);
    let info = provider.get_model_info(&options).await?;
    tracing::info!("モデルの取得が完了しました: {}", info.path);
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn seal(input: &Path, key_file: &Path, output: &Path) -> anyhow::Result<()> {
    let plaintext = std::fs::read(input)
        .with_context(|| format!("モデルファイルを読み込めません: {}", input.display()))?;
    let key = cnap_crypto::Zeroizing::new(
        std::fs::read(key_file)
            .with_context(|| format!("鍵ファイルを読み込めません: {}", key_file.display()))?,
    );
    let sealed = cnap_crypto::seal_envelope(&plaintext, &key)?;

    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("出力ファイル名が不正です: {}", output.display()))?;
    stage(dir, name, &sealed)?;
    Ok(())
}
