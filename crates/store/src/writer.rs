//! DB 작성기 풀 -- 시퀀스 부여된 메시지를 영속화합니다.
//!
//! core의 [`Pipeline`] trait을 구현하여 `histon-daemon`에서 인제스트
//! 파이프라인 다음에 시작되고 먼저가 아닌 나중에 정지됩니다 (드레인).
//!
//! 각 워커는 라인을 다시 파싱해 이벤트 필드를 복원합니다 (파서 출력은
//! 결정적입니다). insert 실패는 같은 메시지를 지수 백오프로 무한
//! 재시도하며, 성공 시에만 백오프가 초기화됩니다. 프로세스 기동 시
//! DB가 없으면 워커들은 드레인 모드로 소비만 계속합니다. 스풀 기록이
//! 내구성을 보장합니다.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use histon_core::error::{HistonError, PipelineError};
use histon_core::event::SequencedMessage;
use histon_core::metrics::{STORE_INSERT_FAIL_TOTAL, STORE_INSERT_OK_TOTAL};
use histon_core::pipeline::{HealthStatus, Pipeline};
use histon_ingest::parse_line;

use crate::db::Db;
use crate::error::StoreError;

/// 초기/성공 후 백오프
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
/// 백오프 상한
const MAX_BACKOFF: Duration = Duration::from_secs(5);

type SharedReceiver = Arc<Mutex<mpsc::Receiver<SequencedMessage>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriterState {
    Initialized,
    Running,
    Stopped,
}

/// DB 작성기 모듈
#[derive(Debug)]
pub struct StoreWriter {
    workers: usize,
    db: Option<Arc<Db>>,
    rx: Option<mpsc::Receiver<SequencedMessage>>,
    state: WriterState,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl StoreWriter {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            WriterState::Initialized => "initialized",
            WriterState::Running => "running",
            WriterState::Stopped => "stopped",
        }
    }

    /// DB 연결 여부를 반환합니다.
    pub fn has_db(&self) -> bool {
        self.db.is_some()
    }
}

impl Pipeline for StoreWriter {
    async fn start(&mut self) -> Result<(), HistonError> {
        if self.state == WriterState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let Some(rx) = self.rx.take() else {
            return Err(PipelineError::AlreadyRunning.into());
        };

        if self.db.is_none() {
            warn!("store writer starting without a database, consuming in drain mode");
        }
        info!(workers = self.workers, "starting store writer pool");

        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let db = self.db.clone();
            let cancel = self.cancel.clone();
            self.tasks.push(tokio::spawn(async move {
                db_worker(worker_id, rx, db, cancel).await;
            }));
        }

        self.state = WriterState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HistonError> {
        if self.state != WriterState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping store writer pool");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            match tokio::time::timeout(Duration::from_secs(10), task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "store writer task panicked during shutdown"),
                Err(_) => warn!("store writer task did not stop within timeout"),
            }
        }

        self.state = WriterState::Stopped;
        info!("store writer pool stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            WriterState::Running if self.db.is_some() => HealthStatus::Healthy,
            WriterState::Running => {
                HealthStatus::Degraded("no database, draining only".to_owned())
            }
            WriterState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            WriterState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn db_worker(
    worker_id: usize,
    rx: SharedReceiver,
    db: Option<Arc<Db>>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "db worker started");
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let msg = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => msg,
            }
        };
        let Some(msg) = msg else {
            debug!(worker_id, "sequenced channel closed, db worker exiting");
            break;
        };

        let Some(db) = db.as_ref() else {
            // 드레인 모드: 소비하고 실패로 계수
            warn!(worker_id, tenant = %msg.tenant_id, seq = msg.seq, "no database, dropping to spool only");
            counter!(STORE_INSERT_FAIL_TOTAL).increment(1);
            continue;
        };

        // 파서 출력은 결정적이므로 라인에서 이벤트를 복원한다
        let (mut ev, _) = parse_line(&msg.tenant_id, &msg.line);
        ev.transport = msg.transport.as_str().to_owned();
        ev.src_ip = Some(msg.peer_ip.to_string());

        // 같은 메시지를 성공할 때까지 재시도한다. 워커 종료는 취소
        // 신호로만 일어난다.
        loop {
            match db.insert_event_with_seq(&ev, msg.seq).await {
                Ok(()) => {
                    debug!(worker_id, tenant = %msg.tenant_id, seq = msg.seq, "insert ok");
                    counter!(STORE_INSERT_OK_TOTAL).increment(1);
                    backoff = INITIAL_BACKOFF;
                    break;
                }
                Err(e) => {
                    warn!(worker_id, tenant = %msg.tenant_id, seq = msg.seq, error = %e, "insert failed, will retry");
                    counter!(STORE_INSERT_FAIL_TOTAL).increment(1);

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    debug!(worker_id, "db worker stopped");
}

/// DB 작성기 빌더
#[derive(Default)]
pub struct StoreWriterBuilder {
    workers: Option<usize>,
    db: Option<Arc<Db>>,
    rx: Option<mpsc::Receiver<SequencedMessage>>,
}

impl StoreWriterBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 워커 수를 설정합니다 (기본 4).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// DB 핸들을 연결합니다. 생략하면 드레인 모드입니다.
    pub fn db(mut self, db: Arc<Db>) -> Self {
        self.db = Some(db);
        self
    }

    /// 시퀀스 부여된 메시지 수신측을 연결합니다.
    pub fn sequenced_receiver(mut self, rx: mpsc::Receiver<SequencedMessage>) -> Self {
        self.rx = Some(rx);
        self
    }

    /// 작성기를 생성합니다.
    pub fn build(self) -> Result<StoreWriter, StoreError> {
        let workers = self.workers.unwrap_or(4);
        if workers == 0 {
            return Err(StoreError::Config {
                field: "db_workers".to_owned(),
                reason: "must be > 0".to_owned(),
            });
        }
        let rx = self.rx.ok_or_else(|| StoreError::Config {
            field: "sequenced_receiver".to_owned(),
            reason: "an upstream channel receiver is required".to_owned(),
        })?;

        Ok(StoreWriter {
            workers,
            db: self.db,
            rx: Some(rx),
            state: WriterState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::SystemTime;

    use histon_core::event::Transport;

    fn sequenced(seq: i64) -> SequencedMessage {
        SequencedMessage {
            line: format!("20240115.103005 - a1b2c3d4 - host > cmd {seq}"),
            tenant_id: "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d".to_owned(),
            seq,
            peer_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            received_at: SystemTime::now(),
            transport: Transport::Raw,
        }
    }

    #[test]
    fn builder_requires_receiver() {
        let err = StoreWriterBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("sequenced_receiver"));
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let (_tx, rx) = mpsc::channel(1);
        let err = StoreWriterBuilder::new()
            .workers(0)
            .sequenced_receiver(rx)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("db_workers"));
    }

    #[tokio::test]
    async fn drain_mode_lifecycle() {
        let (tx, rx) = mpsc::channel(8);
        let mut writer = StoreWriterBuilder::new()
            .workers(2)
            .sequenced_receiver(rx)
            .build()
            .unwrap();

        assert!(!writer.has_db());
        Pipeline::start(&mut writer).await.unwrap();
        assert_eq!(writer.state_name(), "running");
        // DB가 없으면 Degraded
        assert!(matches!(
            Pipeline::health_check(&writer).await,
            HealthStatus::Degraded(_)
        ));

        // 드레인 모드에서도 메시지는 소비된다
        tx.send(sequenced(1)).await.unwrap();
        tx.send(sequenced(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        Pipeline::stop(&mut writer).await.unwrap();
        assert_eq!(writer.state_name(), "stopped");
    }

    #[tokio::test]
    async fn workers_exit_when_channel_closes() {
        let (tx, rx) = mpsc::channel::<SequencedMessage>(8);
        let mut writer = StoreWriterBuilder::new()
            .workers(3)
            .sequenced_receiver(rx)
            .build()
            .unwrap();
        Pipeline::start(&mut writer).await.unwrap();

        drop(tx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // 채널이 닫혀 워커가 스스로 끝나도 stop은 성공해야 한다
        Pipeline::stop(&mut writer).await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_an_error() {
        let (_tx, rx) = mpsc::channel::<SequencedMessage>(1);
        let mut writer = StoreWriterBuilder::new().sequenced_receiver(rx).build().unwrap();
        Pipeline::start(&mut writer).await.unwrap();
        assert!(Pipeline::start(&mut writer).await.is_err());
        Pipeline::stop(&mut writer).await.unwrap();
    }
}
