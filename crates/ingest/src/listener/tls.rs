//! TLS 리스너
//!
//! PEM 인증서/키로 rustls 서버 설정을 만들고 (TLS ≥ 1.2),
//! 핸드셰이크가 끝난 스트림을 평문 리스너와 동일한 프레임 규율로
//! 처리합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use histon_core::event::{RawMessage, Transport};
use histon_core::metrics::{INGEST_CONNECTIONS_TOTAL, LABEL_TRANSPORT};

use super::handle_connection;
use crate::error::IngestError;

/// TLS 핸드셰이크 타임아웃
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// PEM 파일에서 rustls 서버 설정을 로드합니다.
pub fn load_tls_config(
    cert_file: &str,
    key_file: &str,
) -> Result<Arc<rustls::ServerConfig>, IngestError> {
    histon_core::tls::load_server_config(cert_file, key_file)
        .map_err(|e| IngestError::Tls(e.to_string()))
}

/// TLS 인제스트 리스너
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
    max_line_bytes: usize,
    max_connections: usize,
}

impl TlsListener {
    /// 주소에 바인드합니다. 실패는 기동 에러입니다.
    pub async fn bind(
        addr: &str,
        tls_config: Arc<rustls::ServerConfig>,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
        max_line_bytes: usize,
        max_connections: usize,
    ) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IngestError::Listener {
                transport: "tls".to_owned(),
                reason: format!("failed to bind to {addr}: {e}"),
            })?;
        info!(addr, "tls ingest listener bound");
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls_config),
            tx,
            cancel,
            max_line_bytes,
            max_connections,
        })
    }

    /// 바인드된 로컬 주소를 반환합니다.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// 수락 루프를 실행합니다. 취소 신호까지 블록합니다.
    pub async fn run(self) {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "tls accept error");
                            continue;
                        }
                    };

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!(peer = %peer_addr.ip(), "max connections reached, rejecting");
                            continue;
                        }
                    };

                    let acceptor = self.acceptor.clone();
                    let tx = self.tx.clone();
                    let cancel = self.cancel.clone();
                    let max_line_bytes = self.max_line_bytes;
                    tokio::spawn(async move {
                        match timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                            Ok(Ok(tls_stream)) => {
                                counter!(INGEST_CONNECTIONS_TOTAL, LABEL_TRANSPORT => "tls")
                                    .increment(1);
                                handle_connection(
                                    tls_stream,
                                    peer_addr,
                                    Transport::Tls,
                                    max_line_bytes,
                                    tx,
                                    cancel,
                                )
                                .await;
                            }
                            Ok(Err(e)) => {
                                debug!(peer = %peer_addr.ip(), error = %e, "tls handshake failed");
                            }
                            Err(_) => {
                                debug!(peer = %peer_addr.ip(), "tls handshake timed out");
                            }
                        }
                        drop(permit);
                    });
                }
                _ = self.cancel.cancelled() => {
                    info!("tls ingest listener shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_is_a_tls_error() {
        let err = load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(matches!(err, IngestError::Tls(_)));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn empty_pem_reports_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("empty.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let err =
            load_tls_config(cert.to_str().unwrap(), key.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }
}
