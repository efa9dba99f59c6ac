//! 평문 TCP 리스너
//!
//! 수락 시점에 선택적으로 CIDR ACL을 평가합니다 (설정에서 ACL을 참조한
//! 경우에만). ACL을 통과하지 못한 피어의 프레임은 읽지 않고 닫습니다.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics::counter;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use histon_core::event::{RawMessage, Transport};
use histon_core::metrics::{
    INGEST_CONNECTIONS_TOTAL, INGEST_LINES_DROPPED_TOTAL, LABEL_REASON, LABEL_TRANSPORT,
};
use histon_core::net::CompiledAcl;

use super::handle_connection;
use crate::error::IngestError;

/// 평문 TCP 인제스트 리스너
///
/// 각 연결은 별도 tokio 태스크에서 처리되고, 세마포어로 동시 연결 수를
/// 제한합니다.
#[derive(Debug)]
pub struct RawListener {
    listener: TcpListener,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
    acl: Option<Arc<CompiledAcl>>,
    max_line_bytes: usize,
    max_connections: usize,
}

impl RawListener {
    /// 주소에 바인드합니다. 실패는 기동 에러입니다.
    pub async fn bind(
        addr: &str,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
        acl: Option<Arc<CompiledAcl>>,
        max_line_bytes: usize,
        max_connections: usize,
    ) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IngestError::Listener {
                transport: "raw".to_owned(),
                reason: format!("failed to bind to {addr}: {e}"),
            })?;
        info!(addr, "raw ingest listener bound");
        Ok(Self {
            listener,
            tx,
            cancel,
            acl,
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
                            warn!(error = %e, "raw accept error");
                            continue;
                        }
                    };

                    // 수락 시점 ACL 평가 (설정된 경우에만)
                    if let Some(acl) = &self.acl {
                        if !acl.permits(peer_addr.ip()) {
                            debug!(peer = %peer_addr.ip(), "peer rejected by acl");
                            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "acl").increment(1);
                            continue;
                        }
                    }

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!(peer = %peer_addr.ip(), "max connections reached, rejecting");
                            continue;
                        }
                    };

                    counter!(INGEST_CONNECTIONS_TOTAL, LABEL_TRANSPORT => "raw").increment(1);

                    let tx = self.tx.clone();
                    let cancel = self.cancel.clone();
                    let max_line_bytes = self.max_line_bytes;
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, Transport::Raw, max_line_bytes, tx, cancel)
                            .await;
                        drop(permit);
                    });
                }
                _ = self.cancel.cancelled() => {
                    info!("raw ingest listener shutting down");
                    break;
                }
            }
        }
    }
}
