//! # テスト用共通ヘルパー
//!
//! 鍵ブローカー・モデルサーバーのモック群と、トレイト注入用のフェイク実装。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use rand::RngCore;

use cnap_crypto::{seal_envelope, wrap_key};
use cnap_types::{TransferRequest, TransferResponse};

use crate::error::LoaderError;
use crate::infra::http_client::HttpResponse;
use crate::keybroker::transport::{TransferTransport, TransportError, TransportFuture};
use crate::runtime::mock::MockEvidenceProvider;
use crate::runtime::EvidenceProvider;

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

pub fn random_key() -> Vec<u8> {
    let mut key = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// テスト用モックHTTPサーバーを起動し、ポート番号を返す。
pub async fn start_mock_server(app: axum::Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

/// 何もリッスンしていないポート（接続拒否になる）。
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// 接続を受け付けてリクエストを読んだ直後に切断するサーバー。
///
/// 受け付けた接続数を返すカウンタを共有する。
pub async fn start_dropping_server() -> (u16, Arc<AtomicUsize>) {
    use tokio::io::AsyncReadExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            drop(stream);
        }
    });
    (port, accepted)
}

/// `chunks` 個のチャンクを `interval` おきに送るHTTPサーバー。
///
/// 全体では `chunks × interval` かかるが、1回の待ちは `interval` を超えない。
/// 各チャンクは `chunk` を繰り返した8バイト。
pub async fn start_slow_body_server(
    chunk: u8,
    chunks: usize,
    interval: std::time::Duration,
) -> u16 {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    chunks * 8
                );
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 0..chunks {
                    tokio::time::sleep(interval).await;
                    if stream.write_all(&[chunk; 8]).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;
                }
            });
        }
    });
    port
}

/// ブローカーの処理を模して転送リクエストに応答する。
///
/// `user_data` の公開鍵でSWKをラップし、SWKでコンテンツ鍵をエンベロープ化する。
pub fn fake_broker_reply(request_body: &[u8], content_key: &[u8]) -> Result<Vec<u8>, String> {
    let req: TransferRequest = serde_json::from_slice(request_body).map_err(|e| e.to_string())?;
    let pubkey_der = b64().decode(&req.user_data).map_err(|e| e.to_string())?;
    let swk = random_key();
    let wrapped_swk = wrap_key(&pubkey_der, &swk).map_err(|e| e.to_string())?;
    let wrapped_key = seal_envelope(content_key, &swk).map_err(|e| e.to_string())?;
    let resp = TransferResponse {
        wrapped_key: Some(b64().encode(wrapped_key)),
        wrapped_swk: Some(b64().encode(wrapped_swk)),
    };
    serde_json::to_vec(&resp).map_err(|e| e.to_string())
}

/// 鍵転送エンドポイントを持つモックブローカーのルーター。
///
/// `Attestation-Type: TDX` がないリクエストは400、`key_id == "missing"` は404。
pub fn mock_broker_router(content_key: Vec<u8>) -> axum::Router {
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;

    async fn transfer(
        State(content_key): State<Arc<Vec<u8>>>,
        Path(key_id): Path<String>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> axum::response::Response {
        let header_is = |name: &str, value: &str| {
            headers.get(name).and_then(|v| v.to_str().ok()) == Some(value)
        };
        if !header_is("attestation-type", "TDX")
            || !header_is("accept", "application/json")
            || !header_is("content-type", "application/json")
        {
            return (StatusCode::BAD_REQUEST, "missing headers").into_response();
        }
        if key_id == "missing" {
            return (StatusCode::NOT_FOUND, "no such key").into_response();
        }
        match fake_broker_reply(&body, &content_key) {
            Ok(reply) => (StatusCode::OK, reply).into_response(),
            Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
        }
    }

    axum::Router::new()
        .route("/keys/{key_id}/transfer", axum::routing::post(transfer))
        .with_state(Arc::new(content_key))
}

// ---------------------------------------------------------------------------
// フェイクトランスポート
// ---------------------------------------------------------------------------

/// スクリプト化したトランスポートの1試行分の挙動。
#[derive(Debug, Clone)]
pub enum Step {
    /// 接続失敗
    ConnectFail,
    /// 接続以外の通信失敗
    OtherFail,
    /// 固定のステータスとボディ
    Reply(u16, Vec<u8>),
    /// ブローカーとして正しく応答
    Broker,
    /// 応答しない
    Hang,
}

/// 試行ごとの挙動をスクリプトで指定できるトランスポート。
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    content_key: Vec<u8>,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<(String, Vec<(String, String)>, Vec<u8>)>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>, content_key: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            content_key,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransferTransport for ScriptedTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'a str, &'a str)],
        body: &'a [u8],
    ) -> TransportFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((
            url.to_string(),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body.to_vec(),
        ));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::ConnectFail);

        Box::pin(async move {
            match step {
                Step::ConnectFail => Err(TransportError::Connect("connection refused".into())),
                Step::OtherFail => Err(TransportError::Other("body read error".into())),
                Step::Reply(status, body) => Ok(HttpResponse { status, body }),
                Step::Broker => {
                    let reply = fake_broker_reply(body, &self.content_key)
                        .map_err(TransportError::Other)?;
                    Ok(HttpResponse {
                        status: 200,
                        body: reply,
                    })
                }
                Step::Hang => std::future::pending().await,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// フェイクEvidenceプロバイダ
// ---------------------------------------------------------------------------

/// 常に失敗するEvidenceプロバイダ（TEE不在を模擬）。
pub struct FailingEvidenceProvider;

impl EvidenceProvider for FailingEvidenceProvider {
    fn tee_type(&self) -> &str {
        "none"
    }

    fn get_evidence(&self, _binding_data: &[u8]) -> Result<Vec<u8>, LoaderError> {
        Err(LoaderError::EvidenceUnavailable("TEEが存在しません".to_string()))
    }
}

/// 受け取ったbinding_dataを記録するEvidenceプロバイダ。
#[derive(Default)]
pub struct RecordingEvidenceProvider {
    inner: MockEvidenceProvider,
    pub bindings: Mutex<Vec<Vec<u8>>>,
    pub evidences: Mutex<Vec<Vec<u8>>>,
}

impl EvidenceProvider for RecordingEvidenceProvider {
    fn tee_type(&self) -> &str {
        self.inner.tee_type()
    }

    fn get_evidence(&self, binding_data: &[u8]) -> Result<Vec<u8>, LoaderError> {
        self.bindings.lock().unwrap().push(binding_data.to_vec());
        let evidence = self.inner.get_evidence(binding_data)?;
        self.evidences.lock().unwrap().push(evidence.clone());
        Ok(evidence)
    }
}
