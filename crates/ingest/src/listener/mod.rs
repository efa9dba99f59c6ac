//! 인제스트 리스너 -- 평문 TCP / TLS 수신
//!
//! 활성화된 엔드포인트마다 acceptor 태스크 하나가 돌고, 수락된 연결은
//! 각각 별도 태스크에서 독립적으로 처리됩니다. 연결은 프레임 하나를
//! 전달한 뒤 닫히며 재사용되지 않습니다.

pub mod frame;
pub mod tcp;
pub mod tls;

pub use frame::{read_frame, Frame};
pub use tcp::RawListener;
pub use tls::{load_tls_config, TlsListener};

use std::net::{IpAddr, SocketAddr};

use metrics::counter;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use histon_core::event::{RawMessage, Transport};
use histon_core::metrics::{INGEST_LINES_DROPPED_TOTAL, LABEL_REASON};

/// 수락된 연결 하나를 처리합니다: 한 프레임 읽기 → rawQ 전송 → 종료.
///
/// 트랜스포트와 무관하게 공유됩니다 (TLS 스트림도 `AsyncRead`).
pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    transport: Transport,
    max_line_bytes: usize,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
) where
    S: AsyncRead + Unpin,
{
    let peer_ip: IpAddr = peer_addr.ip();

    let frame = tokio::select! {
        result = read_frame(&mut stream, max_line_bytes) => match result {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %peer_ip, transport = %transport, error = %e, "read error, dropping frame");
                counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "frame").increment(1);
                return;
            }
        },
        _ = cancel.cancelled() => return,
    };

    let line = match frame {
        Frame::Line(line) => line,
        Frame::Empty => {
            debug!(peer = %peer_ip, transport = %transport, "empty frame");
            return;
        }
        Frame::TooBig => {
            debug!(peer = %peer_ip, transport = %transport, "frame too big, dropping");
            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "frame").increment(1);
            return;
        }
        Frame::BadFraming => {
            debug!(peer = %peer_ip, transport = %transport, "bad framing, dropping");
            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "frame").increment(1);
            return;
        }
    };

    let msg = RawMessage::new(line, peer_ip, transport);
    tokio::select! {
        result = tx.send(msg) => {
            if result.is_err() {
                debug!(peer = %peer_ip, "raw channel closed, dropping frame");
                counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "queue").increment(1);
            }
        }
        _ = cancel.cancelled() => {}
    }
}
