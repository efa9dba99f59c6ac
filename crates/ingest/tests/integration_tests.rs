//! 인제스트 파이프라인 통합 테스트
//!
//! 실제 TCP 연결로 프레임 규율, 테넌트 해석, 시퀀스 부여까지
//! 파이프라인 전체를 검증합니다. DB는 mock 스토어로 대체합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use histon_core::config::AuthMode;
use histon_core::event::{SequencedMessage, Transport};
use histon_core::pipeline::{BoxFuture, Pipeline};
use histon_core::storage::{ApiKeyRecord, ApiKeyStore, SequenceStore};
use histon_core::StorageError;
use histon_ingest::config::ListenerSettings;
use histon_ingest::{IngestPipelineBuilder, IngestPipelineConfig};

const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";
const KEYED_TENANT: &str = "77e3b7f0-2222-4444-8888-aaaaaaaaaaaa";
const PEPPER: &str = "integration-pepper";
const SECRET: &str = "s3cr3ts3cr3ts3cr";

struct MockStore {
    max_seq: i64,
}

impl SequenceStore for MockStore {
    fn max_seq<'a>(&'a self, _tenant_id: &'a str) -> BoxFuture<'a, Result<i64, StorageError>> {
        let value = self.max_seq;
        Box::pin(async move { Ok(value) })
    }
}

impl ApiKeyStore for MockStore {
    fn lookup_key<'a>(
        &'a self,
        key_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ApiKeyRecord>, StorageError>> {
        Box::pin(async move {
            if key_id == "hc_01234567" {
                Ok(Some(ApiKeyRecord {
                    tenant_id: KEYED_TENANT.to_owned(),
                    key_hash: histon_core::credential::hash_secret(SECRET, PEPPER),
                    revoked: false,
                }))
            } else {
                Ok(None)
            }
        })
    }
}

struct TestPipeline {
    pipeline: histon_ingest::IngestPipeline,
    addr: std::net::SocketAddr,
    rx: mpsc::Receiver<SequencedMessage>,
    _spool_dir: tempfile::TempDir,
}

async fn start_pipeline(auth: Vec<AuthMode>, store: Option<Arc<MockStore>>) -> TestPipeline {
    let spool_dir = tempfile::tempdir().unwrap();
    let config = IngestPipelineConfig {
        clear: ListenerSettings {
            enabled: true,
            addr: "127.0.0.1:0".to_owned(),
            auth,
            acl: None,
        },
        spool_dir: spool_dir.path().display().to_string(),
        validate_workers: 2,
        default_tenant_id: TENANT.to_owned(),
        pepper: PEPPER.to_owned(),
        ..Default::default()
    };

    let (tx, rx) = mpsc::channel(64);
    let mut builder = IngestPipelineBuilder::new()
        .config(config)
        .sequenced_sender(tx);
    if let Some(store) = store {
        builder = builder
            .sequence_store(store.clone() as Arc<dyn SequenceStore>)
            .api_key_store(store as Arc<dyn ApiKeyStore>);
    }
    let mut pipeline = builder.build().unwrap();
    pipeline.start().await.unwrap();
    let addr = pipeline.bound_clear_addr().unwrap();

    TestPipeline {
        pipeline,
        addr,
        rx,
        _spool_dir: spool_dir,
    }
}

async fn send_frame(addr: std::net::SocketAddr, payload: &[u8]) {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(payload).await.unwrap();
    drop(conn);
}

async fn expect_message(rx: &mut mpsc::Receiver<SequencedMessage>) -> SequencedMessage {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no sequenced message arrived")
        .expect("channel closed")
}

async fn expect_nothing(rx: &mut mpsc::Receiver<SequencedMessage>) {
    let got = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
    assert!(got.is_err(), "unexpected message: {:?}", got);
}

#[tokio::test]
async fn strict_line_is_sequenced_from_one() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    send_frame(
        t.addr,
        b"20240115.103005 - a1b2c3d4 - host.example [cwd=/tmp] > ls -la\n",
    )
    .await;

    let msg = expect_message(&mut t.rx).await;
    assert_eq!(msg.seq, 1);
    assert_eq!(msg.tenant_id, TENANT);
    assert_eq!(msg.transport, Transport::Raw);
    assert!(msg.line.contains("[cwd=/tmp]"));

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn two_lines_in_one_frame_are_dropped() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    send_frame(
        t.addr,
        b"20240115.103005 - a1b2c3d4 - host > one\n20240115.103006 - a1b2c3d4 - host > two\n",
    )
    .await;
    expect_nothing(&mut t.rx).await;

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn frame_without_trailing_lf_is_dropped() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    send_frame(t.addr, b"20240115.103005 - a1b2c3d4 - host > ls").await;
    expect_nothing(&mut t.rx).await;

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn oversize_frame_is_dropped() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    // max_line_bytes 기본 16 KiB를 넘는 LF 없는 페이로드
    let big = vec![b'x'; 17 * 1024];
    send_frame(t.addr, &big).await;
    expect_nothing(&mut t.rx).await;

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn non_strict_line_is_dropped() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    send_frame(t.addr, b"20240115.103005 - a1b2c3d4 - host  no arrow form\n").await;
    expect_nothing(&mut t.rx).await;

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn sequences_continue_across_messages() {
    let mut t = start_pipeline(vec![AuthMode::None], None).await;

    for i in 0..3 {
        send_frame(
            t.addr,
            format!("20240115.10300{i} - a1b2c3d4 - host > cmd {i}\n").as_bytes(),
        )
        .await;
        let msg = expect_message(&mut t.rx).await;
        assert_eq!(msg.seq, i + 1);
    }

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn initial_seq_comes_from_db_max() {
    let store = Arc::new(MockStore { max_seq: 499 });
    let mut t = start_pipeline(vec![AuthMode::None], Some(store)).await;

    send_frame(t.addr, b"20240115.103005 - a1b2c3d4 - host > after restart\n").await;
    let msg = expect_message(&mut t.rx).await;
    assert_eq!(msg.seq, 500);

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn api_key_routes_to_key_tenant_and_strips_token() {
    let store = Arc::new(MockStore { max_seq: 0 });
    let mut t = start_pipeline(vec![AuthMode::ApiKey], Some(store)).await;

    let frame = format!(
        "20240115.103005 - a1b2c3d4 - host > ]apikey[hc_01234567.{SECRET}] > ls -la\n"
    );
    send_frame(t.addr, frame.as_bytes()).await;

    let msg = expect_message(&mut t.rx).await;
    assert_eq!(msg.tenant_id, KEYED_TENANT);
    assert!(!msg.line.contains("hc_01234567"), "token must be stripped");
    assert!(!msg.line.contains(SECRET), "secret must be stripped");
    assert!(msg.line.contains("> ls -la"));

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn message_without_key_is_dropped_when_apikey_only() {
    let store = Arc::new(MockStore { max_seq: 0 });
    let mut t = start_pipeline(vec![AuthMode::ApiKey], Some(store)).await;

    send_frame(t.addr, b"20240115.103005 - a1b2c3d4 - host > ls\n").await;
    expect_nothing(&mut t.rx).await;

    t.pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn apikey_then_none_falls_back_to_default_tenant() {
    let store = Arc::new(MockStore { max_seq: 0 });
    let mut t = start_pipeline(vec![AuthMode::ApiKey, AuthMode::None], Some(store)).await;

    send_frame(t.addr, b"20240115.103005 - a1b2c3d4 - host > plain\n").await;
    let msg = expect_message(&mut t.rx).await;
    assert_eq!(msg.tenant_id, TENANT);

    let keyed = format!(
        "20240115.103005 - a1b2c3d4 - host > ]apikey[hc_01234567.{SECRET}] keyed\n"
    );
    send_frame(t.addr, keyed.as_bytes()).await;
    let msg = expect_message(&mut t.rx).await;
    assert_eq!(msg.tenant_id, KEYED_TENANT);

    t.pipeline.stop().await.unwrap();
}
