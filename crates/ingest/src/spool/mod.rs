//! 스풀러 -- 단일 작성자, 테넌트별 append-only 로그와 시퀀스 부여
//!
//! 파이프라인에 스풀러는 정확히 하나이므로 테넌트별 시퀀스는 경쟁 없이
//! 단조 증가합니다. 레코드는 DB보다 먼저 스풀 파일에 기록됩니다
//! (durable-before-queue).
//!
//! # 스풀 레코드 형식
//!
//! ```text
//! SEQ <TAB> ESCAPED_LINE <LF>
//! ```
//!
//! `ESCAPED_LINE`은 원본에서 CR/LF를 리터럴 2문자 `\r`/`\n`으로 치환한
//! 것으로, 레코드 하나가 항상 파일의 한 줄을 차지합니다.

pub mod tail;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use histon_core::event::{SequencedMessage, ValidatedMessage};
use histon_core::metrics::{
    INGEST_LINES_DROPPED_TOTAL, INGEST_LINES_SPOOLED_TOTAL, LABEL_REASON,
};
use histon_core::storage::SequenceStore;

use crate::error::IngestError;

pub use tail::read_last_seq;

/// 열려 있는 테넌트 스풀 하나
struct TenantSpool {
    file: File,
    #[allow(dead_code)] // 진단 로그용
    path: PathBuf,
    seq: i64,
    writes_since_sync: u32,
    last_sync: Instant,
}

/// 스풀러 — 검증된 메시지를 소비해 시퀀스를 부여하고 다운스트림에 전달
pub struct Spooler {
    dir: PathBuf,
    sync_every_n: u32,
    sync_every: Duration,
    seq_store: Option<Arc<dyn SequenceStore>>,
    rx: mpsc::Receiver<ValidatedMessage>,
    tx: mpsc::Sender<SequencedMessage>,
    cancel: CancellationToken,
}

impl Spooler {
    /// 새 스풀러를 생성합니다.
    pub fn new(
        dir: impl Into<PathBuf>,
        sync_every_n: u32,
        sync_every: Duration,
        seq_store: Option<Arc<dyn SequenceStore>>,
        rx: mpsc::Receiver<ValidatedMessage>,
        tx: mpsc::Sender<SequencedMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dir: dir.into(),
            sync_every_n,
            sync_every,
            seq_store,
            rx,
            tx,
            cancel,
        }
    }

    /// 스풀러 루프를 실행합니다.
    ///
    /// 취소 신호 또는 업스트림 채널 종료까지 블록하며, 종료 시 모든
    /// 스풀 파일을 fsync 후 닫고 다운스트림 채널을 닫습니다 (tx drop).
    pub async fn run(mut self) {
        let mut spools: HashMap<String, TenantSpool> = HashMap::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("spooler received shutdown signal");
                    break;
                }
                msg = self.rx.recv() => {
                    let Some(msg) = msg else {
                        info!("spool channel closed, spooler draining done");
                        break;
                    };
                    self.process(&mut spools, msg).await;
                }
            }
        }

        for spool in spools.values_mut() {
            if let Err(e) = spool.file.sync_all().await {
                warn!(error = %e, "spool sync on shutdown failed");
            }
        }
        // self.tx drop => 다운스트림 채널 close
    }

    async fn process(&self, spools: &mut HashMap<String, TenantSpool>, msg: ValidatedMessage) {
        let spool = match self.get_or_open(spools, &msg.tenant_id).await {
            Ok(spool) => spool,
            Err(e) => {
                warn!(tenant = %msg.tenant_id, error = %e, "spool open failed");
                counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "spool_io").increment(1);
                return;
            }
        };

        spool.seq += 1;
        let seq = spool.seq;
        debug!(tenant = %msg.tenant_id, seq, "sequence assigned");

        let record = build_record(seq, &msg.line);
        if let Err(e) = spool.file.write_all(record.as_bytes()).await {
            warn!(tenant = %msg.tenant_id, seq, error = %e, "spool write failed");
            counter!(INGEST_LINES_DROPPED_TOTAL, LABEL_REASON => "spool_io").increment(1);
            return;
        }
        counter!(INGEST_LINES_SPOOLED_TOTAL).increment(1);

        self.maybe_sync(spool).await;

        let out = SequencedMessage::from_validated(msg, seq);
        tokio::select! {
            result = self.tx.send(out) => {
                if result.is_err() {
                    // 스풀에는 이미 기록되었으므로 내구성은 유지된다
                    debug!("sequenced channel closed, message stays in spool only");
                }
            }
            _ = self.cancel.cancelled() => {}
        }
    }

    /// 테넌트 스풀을 찾거나 처음 엽니다.
    ///
    /// 최초 오픈 시 시퀀스를 `max(스풀 꼬리, DB max(seq))`로 시딩합니다.
    async fn get_or_open<'a>(
        &self,
        spools: &'a mut HashMap<String, TenantSpool>,
        tenant_id: &str,
    ) -> Result<&'a mut TenantSpool, IngestError> {
        match spools.entry(tenant_id.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let spool = self.open_spool(tenant_id).await?;
                Ok(entry.insert(spool))
            }
        }
    }

    async fn open_spool(&self, tenant_id: &str) -> Result<TenantSpool, IngestError> {
        let path = self.dir.join(format!("{tenant_id}.log"));
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| IngestError::Spool {
                tenant_id: tenant_id.to_owned(),
                reason: format!("open {}: {e}", path.display()),
            })?;

        let tail_seq = match tail::read_last_seq(&path).await {
            Ok(seq) => seq,
            Err(e) => {
                info!(tenant = tenant_id, reason = %e, "no usable spool tail, starting from 0");
                0
            }
        };

        let mut seq = tail_seq;
        if let Some(store) = &self.seq_store {
            match store.max_seq(tenant_id).await {
                Ok(db_seq) if db_seq > seq => {
                    info!(tenant = tenant_id, db_seq, tail_seq, "db max seq wins for initial seq");
                    seq = db_seq;
                }
                Ok(_) => {}
                Err(e) => {
                    info!(tenant = tenant_id, error = %e, "db max seq unavailable");
                }
            }
        }

        info!(tenant = tenant_id, initial_seq = seq, path = %path.display(), "tenant spool opened");
        Ok(TenantSpool {
            file,
            path,
            seq,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// fsync 정책: N회 쓰기마다 또는 T 경과마다. N이 발화하면 T도 리셋.
    async fn maybe_sync(&self, spool: &mut TenantSpool) {
        let now = Instant::now();
        if self.sync_every_n > 0 {
            spool.writes_since_sync += 1;
            if spool.writes_since_sync >= self.sync_every_n {
                if let Err(e) = spool.file.sync_all().await {
                    warn!(error = %e, "spool fsync failed");
                }
                spool.writes_since_sync = 0;
                spool.last_sync = now;
                return;
            }
        }
        if !self.sync_every.is_zero() && now.duration_since(spool.last_sync) >= self.sync_every {
            if let Err(e) = spool.file.sync_all().await {
                warn!(error = %e, "spool fsync failed");
            }
            spool.writes_since_sync = 0;
            spool.last_sync = now;
        }
    }
}

/// 스풀 레코드 한 줄을 만듭니다.
///
/// CR/LF는 리터럴 백슬래시 이스케이프 2문자로 치환됩니다.
pub fn build_record(seq: i64, line: &str) -> String {
    let escaped = line.replace('\r', "\\r").replace('\n', "\\n");
    format!("{seq}\t{escaped}\n")
}
