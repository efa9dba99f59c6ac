//! 검증 워커 풀 -- 테넌트 해석 + 엄격 파싱 게이트
//!
//! 워커들은 rawQ 하나를 공유해 소비합니다 (`Arc<Mutex<Receiver>>`).
//! 엄격 형식([`ParseKind::Complete`])이 아닌 라인과 테넌트 해석에
//! 실패한 라인은 드롭 카운터만 남기고 버려집니다. 다운스트림 채널이
//! 가득 차면 자리가 나거나 취소될 때까지 블록합니다.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use histon_core::event::{RawMessage, ValidatedMessage};
use histon_core::metrics::{
    INGEST_LINES_ACCEPTED_TOTAL, INGEST_LINES_DROPPED_TOTAL, LABEL_REASON,
};

use crate::auth::ResolverSet;
use crate::parser::{parse_line, ParseKind};

/// 공유 수신측 타입 별칭
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// 검증 워커 N개를 스폰합니다.
pub fn spawn_validators(
    count: usize,
    rx: SharedReceiver<RawMessage>,
    tx: mpsc::Sender<ValidatedMessage>,
    resolver: Arc<ResolverSet>,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let rx = Arc::clone(&rx);
            let tx = tx.clone();
            let resolver = Arc::clone(&resolver);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                validation_worker(worker_id, rx, tx, resolver, cancel).await;
            })
        })
        .collect()
}

async fn validation_worker(
    worker_id: usize,
    rx: SharedReceiver<RawMessage>,
    tx: mpsc::Sender<ValidatedMessage>,
    resolver: Arc<ResolverSet>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "validation worker started");

    loop {
        // 수신 대기 동안만 수신측 락을 잡는다
        let msg = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => msg,
            }
        };
        let Some(mut msg) = msg else {
            debug!(worker_id, "raw channel closed, validation worker exiting");
            break;
        };

        let Some(tenant_id) = resolver.resolve(&mut msg).await else {
            debug!(worker_id, peer = %msg.peer_ip, "no tenant resolved, dropping");
            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "auth").increment(1);
            continue;
        };

        let (_, kind) = parse_line(&tenant_id, &msg.line);
        if kind != ParseKind::Complete {
            debug!(worker_id, %kind, "line is not strict form, dropping");
            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "parse").increment(1);
            continue;
        }

        counter!(INGEST_LINES_ACCEPTED_TOTAL).increment(1);

        let out = ValidatedMessage {
            line: msg.line,
            tenant_id,
            peer_ip: msg.peer_ip,
            received_at: msg.received_at,
            transport: msg.transport,
        };

        tokio::select! {
            result = tx.send(out) => {
                if result.is_err() {
                    debug!(worker_id, "spool channel closed, validation worker exiting");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    debug!(worker_id, "validation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use histon_core::config::AuthMode;
    use histon_core::event::Transport;

    use crate::auth::TenantResolver;

    const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";

    fn set_with_default(default_tenant: &str) -> Arc<ResolverSet> {
        Arc::new(ResolverSet::new(
            TenantResolver::new(vec![AuthMode::None], default_tenant, "pepper", None),
            TenantResolver::new(vec![AuthMode::None], default_tenant, "pepper", None),
        ))
    }

    fn resolver() -> Arc<ResolverSet> {
        set_with_default(TENANT)
    }

    fn raw(line: &str) -> RawMessage {
        RawMessage::new(line, IpAddr::V4(Ipv4Addr::LOCALHOST), Transport::Raw)
    }

    #[tokio::test]
    async fn strict_line_passes_validation() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handles = spawn_validators(
            2,
            Arc::new(Mutex::new(raw_rx)),
            out_tx,
            resolver(),
            cancel.clone(),
        );

        raw_tx
            .send(raw("20240115.103005 - a1b2c3d4 - host > ls -la"))
            .await
            .unwrap();

        let msg = out_rx.recv().await.unwrap();
        assert_eq!(msg.tenant_id, TENANT);
        assert_eq!(msg.transport, Transport::Raw);

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn loose_line_is_dropped() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handles = spawn_validators(
            1,
            Arc::new(Mutex::new(raw_rx)),
            out_tx,
            resolver(),
            cancel.clone(),
        );

        // 화살표 없는 관용 형식은 검증을 통과하지 못함
        raw_tx
            .send(raw("20240115.103005 - a1b2c3d4 - host  ls -la"))
            .await
            .unwrap();
        // 뒤따르는 엄격 라인은 통과
        raw_tx
            .send(raw("20240115.103005 - a1b2c3d4 - host > pwd"))
            .await
            .unwrap();

        let msg = out_rx.recv().await.unwrap();
        assert!(msg.line.ends_with("pwd"));

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn workers_exit_when_upstream_closes() {
        let (raw_tx, raw_rx) = mpsc::channel::<RawMessage>(8);
        let (out_tx, _out_rx) = mpsc::channel(8);
        let handles = spawn_validators(
            4,
            Arc::new(Mutex::new(raw_rx)),
            out_tx,
            resolver(),
            CancellationToken::new(),
        );

        drop(raw_tx);
        for handle in handles {
            tokio::time::timeout(std::time::Duration::from_secs(1), handle)
                .await
                .expect("worker did not exit on channel close")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn no_default_tenant_drops_everything() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let no_tenant = set_with_default("");
        let handles = spawn_validators(
            1,
            Arc::new(Mutex::new(raw_rx)),
            out_tx,
            no_tenant,
            cancel.clone(),
        );

        raw_tx
            .send(raw("20240115.103005 - a1b2c3d4 - host > ls"))
            .await
            .unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_millis(300), out_rx.recv()).await;
        assert!(got.is_err(), "unauthenticated message must not pass");

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
