//! 파이프라인 오케스트레이션 -- 리스너/검증/스풀 단계의 전체 흐름 관리
//!
//! [`IngestPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `histon-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! Listeners -> rawQ -> Validators -> spoolQ -> Spooler -> dbQ(외부 주입)
//! ```
//!
//! 채널 소유권이 종료 순서를 만듭니다: 리스너가 rawQ 송신측을,
//! 검증 워커가 spoolQ 송신측을, 스풀러가 dbQ 송신측을 들고 있어
//! 앞 단계가 끝나면 뒤 단계 채널이 차례로 닫힙니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use histon_core::error::{HistonError, PipelineError};
use histon_core::event::SequencedMessage;
use histon_core::pipeline::{HealthStatus, Pipeline};
use histon_core::storage::{ApiKeyStore, SequenceStore};

use crate::auth::{ResolverSet, TenantResolver};
use crate::config::IngestPipelineConfig;
use crate::error::IngestError;
use crate::listener::{load_tls_config, RawListener, TlsListener};
use crate::spool::Spooler;
use crate::validate::spawn_validators;

/// 종료 시 태스크 join 대기 한도
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 인제스트 파이프라인
///
/// # 사용 예시
/// ```ignore
/// let (db_tx, db_rx) = tokio::sync::mpsc::channel(10_000);
/// let mut pipeline = IngestPipelineBuilder::new()
///     .config(config)
///     .sequenced_sender(db_tx)
///     .sequence_store(db.clone())
///     .api_key_store(db)
///     .build()?;
/// pipeline.start().await?;
/// ```
pub struct IngestPipeline {
    config: IngestPipelineConfig,
    state: PipelineState,
    api_keys: Option<Arc<dyn ApiKeyStore>>,
    seq_store: Option<Arc<dyn SequenceStore>>,
    sequenced_tx: Option<mpsc::Sender<SequencedMessage>>,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    bound_clear: Option<SocketAddr>,
    bound_tls: Option<SocketAddr>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("api_keys", &self.api_keys.as_ref().map(|_| "ApiKeyStore"))
            .field("seq_store", &self.seq_store.as_ref().map(|_| "SequenceStore"))
            .field("sequenced_tx", &self.sequenced_tx)
            .field("cancel", &self.cancel)
            .field("tasks", &self.tasks)
            .field("bound_clear", &self.bound_clear)
            .field("bound_tls", &self.bound_tls)
            .finish()
    }
}

impl IngestPipeline {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 평문 리스너가 실제로 바인드된 주소 (시작 후에만 Some).
    ///
    /// 포트 0으로 바인드하는 테스트에서 사용합니다.
    pub fn bound_clear_addr(&self) -> Option<SocketAddr> {
        self.bound_clear
    }

    /// TLS 리스너가 실제로 바인드된 주소 (시작 후에만 Some).
    pub fn bound_tls_addr(&self) -> Option<SocketAddr> {
        self.bound_tls
    }
}

impl Pipeline for IngestPipeline {
    async fn start(&mut self) -> Result<(), HistonError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let Some(sequenced_tx) = self.sequenced_tx.take() else {
            // stop() 이후 재시작은 지원하지 않음
            return Err(PipelineError::AlreadyRunning.into());
        };

        info!("starting ingest pipeline");

        tokio::fs::create_dir_all(&self.config.spool_dir)
            .await
            .map_err(|e| {
                HistonError::Pipeline(PipelineError::InitFailed(format!(
                    "create spool dir '{}': {e}",
                    self.config.spool_dir
                )))
            })?;

        let (raw_tx, raw_rx) = mpsc::channel(self.config.queue_depth);
        let (spool_tx, spool_rx) = mpsc::channel(self.config.queue_depth);

        // 모든 실패 가능한 단계(바인드, TLS 로드)를 태스크 스폰보다 먼저
        // 끝낸다. 부분 기동 상태를 만들지 않기 위함이다.
        let raw_listener = if self.config.clear.enabled {
            let listener = RawListener::bind(
                &self.config.clear.addr,
                raw_tx.clone(),
                self.cancel.clone(),
                self.config.clear.acl.clone().map(Arc::new),
                self.config.max_line_bytes,
                self.config.max_connections,
            )
            .await
            .map_err(HistonError::from)?;
            self.bound_clear = listener.local_addr();
            Some(listener)
        } else {
            None
        };

        let tls_listener = if self.config.tls.enabled {
            let tls_config =
                load_tls_config(&self.config.tls_cert_file, &self.config.tls_key_file)
                    .map_err(HistonError::from)?;
            let listener = TlsListener::bind(
                &self.config.tls.addr,
                tls_config,
                raw_tx.clone(),
                self.cancel.clone(),
                self.config.max_line_bytes,
                self.config.max_connections,
            )
            .await
            .map_err(HistonError::from)?;
            self.bound_tls = listener.local_addr();
            Some(listener)
        } else {
            None
        };

        drop(raw_tx);

        // 트랜스포트별 테넌트 해석기
        let resolvers = Arc::new(ResolverSet::new(
            TenantResolver::new(
                self.config.clear.auth.clone(),
                self.config.default_tenant_id.clone(),
                self.config.pepper.clone(),
                self.api_keys.clone(),
            ),
            TenantResolver::new(
                self.config.tls.auth.clone(),
                self.config.default_tenant_id.clone(),
                self.config.pepper.clone(),
                self.api_keys.clone(),
            ),
        ));

        // 검증 워커 풀
        let raw_rx = Arc::new(Mutex::new(raw_rx));
        self.tasks.extend(spawn_validators(
            self.config.validate_workers,
            raw_rx,
            spool_tx,
            resolvers,
            self.cancel.clone(),
        ));

        // 스풀러 (단일 작성자)
        let spooler = Spooler::new(
            self.config.spool_dir.clone(),
            self.config.spool_sync_every_n,
            self.config.spool_sync_every,
            self.seq_store.clone(),
            spool_rx,
            sequenced_tx,
            self.cancel.clone(),
        );
        self.tasks.push(tokio::spawn(spooler.run()));

        if let Some(listener) = raw_listener {
            self.tasks.push(tokio::spawn(listener.run()));
        }
        if let Some(listener) = tls_listener {
            self.tasks.push(tokio::spawn(listener.run()));
        }

        self.state = PipelineState::Running;
        info!(
            clear = ?self.bound_clear,
            tls = ?self.bound_tls,
            workers = self.config.validate_workers,
            "ingest pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HistonError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping ingest pipeline");
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            match tokio::time::timeout(STOP_JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "ingest task panicked during shutdown"),
                Err(_) => warn!("ingest task did not stop within timeout"),
            }
        }

        self.state = PipelineState::Stopped;
        info!("ingest pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => HealthStatus::Healthy,
            PipelineState::Initialized => {
                HealthStatus::Unhealthy("not started".to_owned())
            }
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 인제스트 파이프라인 빌더
#[derive(Default)]
pub struct IngestPipelineBuilder {
    config: Option<IngestPipelineConfig>,
    api_keys: Option<Arc<dyn ApiKeyStore>>,
    seq_store: Option<Arc<dyn SequenceStore>>,
    sequenced_tx: Option<mpsc::Sender<SequencedMessage>>,
}

impl IngestPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: IngestPipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// `apikey` 인증 모드가 사용할 키 스토어를 연결합니다.
    pub fn api_key_store(mut self, store: Arc<dyn ApiKeyStore>) -> Self {
        self.api_keys = Some(store);
        self
    }

    /// 시퀀스 시딩에 사용할 스토어를 연결합니다.
    pub fn sequence_store(mut self, store: Arc<dyn SequenceStore>) -> Self {
        self.seq_store = Some(store);
        self
    }

    /// 시퀀스 부여된 메시지를 내보낼 채널 송신측을 연결합니다.
    pub fn sequenced_sender(mut self, tx: mpsc::Sender<SequencedMessage>) -> Self {
        self.sequenced_tx = Some(tx);
        self
    }

    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn build(self) -> Result<IngestPipeline, IngestError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let sequenced_tx = self.sequenced_tx.ok_or_else(|| IngestError::Config {
            field: "sequenced_sender".to_owned(),
            reason: "a downstream channel sender is required".to_owned(),
        })?;

        Ok(IngestPipeline {
            config,
            state: PipelineState::Initialized,
            api_keys: self.api_keys,
            seq_store: self.seq_store,
            sequenced_tx: Some(sequenced_tx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            bound_clear: None,
            bound_tls: None,
        })
    }
}
