//! End-to-end channel wiring: ingest pipeline feeding the store writer.
//!
//! Uses a real TCP connection and a drain-mode store writer (no
//! database). The observable outcome is the durable spool record.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use histon_core::config::AuthMode;
use histon_core::pipeline::Pipeline;
use histon_ingest::config::ListenerSettings;
use histon_ingest::{IngestPipelineBuilder, IngestPipelineConfig};
use histon_store::StoreWriterBuilder;

const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";

#[tokio::test]
async fn frames_flow_from_listener_to_writer_and_spool() {
    let spool_dir = tempfile::tempdir().unwrap();

    let (sequenced_tx, sequenced_rx) = mpsc::channel(1024);

    let ingest_config = IngestPipelineConfig {
        clear: ListenerSettings {
            enabled: true,
            addr: "127.0.0.1:0".to_owned(),
            auth: vec![AuthMode::None],
            acl: None,
        },
        spool_dir: spool_dir.path().display().to_string(),
        validate_workers: 2,
        default_tenant_id: TENANT.to_owned(),
        ..Default::default()
    };

    let mut ingest = IngestPipelineBuilder::new()
        .config(ingest_config)
        .sequenced_sender(sequenced_tx)
        .build()
        .unwrap();
    let mut writer = StoreWriterBuilder::new()
        .workers(2)
        .sequenced_receiver(sequenced_rx)
        .build()
        .unwrap();

    // Producers before consumers
    ingest.start().await.unwrap();
    writer.start().await.unwrap();

    let addr = ingest.bound_clear_addr().unwrap();
    for i in 0..3 {
        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(
            format!("20240115.10300{i} - a1b2c3d4 - host.example > command {i}\n").as_bytes(),
        )
        .await
        .unwrap();
        drop(conn);
    }

    // Wait for the spool to see all three records
    let spool_path = spool_dir.path().join(format!("{TENANT}.log"));
    let mut content = String::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        content = tokio::fs::read_to_string(&spool_path)
            .await
            .unwrap_or_default();
        if content.lines().count() == 3 {
            break;
        }
    }

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3, "spool content: {content:?}");
    assert!(lines[0].starts_with("1\t"));
    assert!(lines[1].starts_with("2\t"));
    assert!(lines[2].starts_with("3\t"));
    assert!(lines[0].contains("command 0"));

    // Shutdown in startup order (producers first)
    ingest.stop().await.unwrap();
    writer.stop().await.unwrap();
}

#[tokio::test]
async fn writer_survives_ingest_shutdown() {
    let spool_dir = tempfile::tempdir().unwrap();
    let (sequenced_tx, sequenced_rx) = mpsc::channel(64);

    let ingest_config = IngestPipelineConfig {
        clear: ListenerSettings {
            enabled: true,
            addr: "127.0.0.1:0".to_owned(),
            auth: vec![AuthMode::None],
            acl: None,
        },
        spool_dir: spool_dir.path().display().to_string(),
        validate_workers: 1,
        default_tenant_id: TENANT.to_owned(),
        ..Default::default()
    };

    let mut ingest = IngestPipelineBuilder::new()
        .config(ingest_config)
        .sequenced_sender(sequenced_tx)
        .build()
        .unwrap();
    let mut writer = StoreWriterBuilder::new()
        .workers(1)
        .sequenced_receiver(sequenced_rx)
        .build()
        .unwrap();

    ingest.start().await.unwrap();
    writer.start().await.unwrap();

    ingest.stop().await.unwrap();
    // The upstream channel closed; stopping the writer must still succeed
    writer.stop().await.unwrap();
}
