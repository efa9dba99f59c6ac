//! 익스포트 서비스 -- axum 라우터와 HTTP/HTTPS 리스너
//!
//! `/export`는 GET 전용이며 (다른 메서드는 405 + `Allow: GET`),
//! 행을 grep 파이프라인에 통과시키며 `text/plain` 스트림으로
//! 내보냅니다. 200행마다 청크가 플러시되고 요청 전체는
//! `globals.max_seconds` 데드라인에 묶입니다.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use metrics::counter;
use sqlx::Row;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use histon_core::error::{HistonError, PipelineError};
use histon_core::metrics::{EXPORT_REQUESTS_TOTAL, EXPORT_ROWS_STREAMED_TOTAL};
use histon_core::pipeline::{HealthStatus, Pipeline};
use histon_core::storage::ApiKeyStore;
use histon_store::Db;

use crate::auth::{
    acl_check, allow_all, resolve_tenant, run_auth_pipeline, AuthCheck, AuthOutcome, ConnData,
};
use crate::config::{EndpointSettings, ExportServiceConfig};
use crate::error::ExportError;
use crate::grep::GrepPipeline;
use crate::query::{build_export_sql, parse_export_query, ExportQuery};

/// 행 N개마다 청크를 내보냅니다.
const FLUSH_EVERY_ROWS: usize = 200;

/// TLS 핸드셰이크 타임아웃
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// 핸들러가 공유하는 상태
#[derive(Clone)]
struct AppState {
    config: Arc<ExportServiceConfig>,
    db: Option<Arc<Db>>,
    keys: Option<Arc<dyn ApiKeyStore>>,
    authz: Arc<Vec<AuthCheck>>,
    auth_modes: Vec<histon_core::config::AuthMode>,
    is_tls: bool,
}

/// 익스포트 서비스 모듈
pub struct ExportService {
    config: Arc<ExportServiceConfig>,
    db: Option<Arc<Db>>,
    keys: Option<Arc<dyn ApiKeyStore>>,
    state: ServiceState,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    bound_http: Option<SocketAddr>,
    bound_https: Option<SocketAddr>,
}

impl ExportService {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// HTTP 엔드포인트가 실제로 바인드된 주소 (시작 후에만 Some).
    pub fn bound_http_addr(&self) -> Option<SocketAddr> {
        self.bound_http
    }

    /// HTTPS 엔드포인트가 실제로 바인드된 주소 (시작 후에만 Some).
    pub fn bound_https_addr(&self) -> Option<SocketAddr> {
        self.bound_https
    }

    fn app_state(&self, endpoint: &EndpointSettings, is_tls: bool) -> AppState {
        // 인가 파이프라인: ACL이 설정되어 있으면 그 검사가, 아니면
        // 무조건 허용이 유일한 단계다
        let authz: Vec<AuthCheck> = match &endpoint.acl {
            Some(acl) => vec![acl_check(Arc::new(acl.clone()))],
            None => vec![allow_all()],
        };
        AppState {
            config: Arc::clone(&self.config),
            db: self.db.clone(),
            keys: self.keys.clone(),
            authz: Arc::new(authz),
            auth_modes: endpoint.auth.clone(),
            is_tls,
        }
    }
}

/// 엔드포인트용 axum 라우터를 만듭니다.
fn router(state: AppState) -> Router {
    Router::new()
        .route("/export", get(handle_export))
        .route("/web_app", get(handle_web_app))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl Pipeline for ExportService {
    async fn start(&mut self) -> Result<(), HistonError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting export service");

        // 모든 실패 가능한 단계(바인드, TLS 로드)를 태스크 스폰보다 먼저
        // 끝낸다. 부분 기동 상태를 만들지 않기 위함이다.
        let http_listener = if self.config.http.enabled {
            let listener = TcpListener::bind(&self.config.http.addr)
                .await
                .map_err(|e| {
                    HistonError::from(ExportError::Listener(format!(
                        "failed to bind http to {}: {e}",
                        self.config.http.addr
                    )))
                })?;
            self.bound_http = listener.local_addr().ok();
            Some(listener)
        } else {
            None
        };

        let https_parts = if self.config.https.enabled {
            let tls_config = histon_core::tls::load_server_config(
                &self.config.tls_cert_file,
                &self.config.tls_key_file,
            )
            .map_err(|e| HistonError::from(ExportError::Tls(e.to_string())))?;
            let listener = TcpListener::bind(&self.config.https.addr)
                .await
                .map_err(|e| {
                    HistonError::from(ExportError::Listener(format!(
                        "failed to bind https to {}: {e}",
                        self.config.https.addr
                    )))
                })?;
            self.bound_https = listener.local_addr().ok();
            Some((listener, TlsAcceptor::from(tls_config)))
        } else {
            None
        };

        if let Some(listener) = http_listener {
            let app = router(self.app_state(&self.config.http, false));
            let cancel = self.cancel.clone();
            self.tasks.push(tokio::spawn(serve_http(listener, app, cancel)));
            info!(addr = ?self.bound_http, "export http endpoint bound");
        }
        if let Some((listener, acceptor)) = https_parts {
            let app = router(self.app_state(&self.config.https, true));
            let cancel = self.cancel.clone();
            self.tasks
                .push(tokio::spawn(serve_https(listener, acceptor, app, cancel)));
            info!(addr = ?self.bound_https, "export https endpoint bound");
        }

        self.state = ServiceState::Running;
        info!("export service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HistonError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping export service");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            match tokio::time::timeout(Duration::from_secs(10), task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "export task panicked during shutdown"),
                Err(_) => warn!("export task did not stop within timeout"),
            }
        }

        self.state = ServiceState::Stopped;
        info!("export service stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running if self.db.is_some() => HealthStatus::Healthy,
            ServiceState::Running => {
                HealthStatus::Degraded("no database, export queries unavailable".to_owned())
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn serve_http(listener: TcpListener, app: Router, cancel: CancellationToken) {
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
    {
        warn!(error = %e, "export http server error");
    }
}

async fn serve_https(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    cancel: CancellationToken,
) {
    let mut make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "export https accept error");
                        continue;
                    }
                };

                let service = match make_service.call(peer_addr).await {
                    Ok(service) => service,
                    Err(infallible) => match infallible {},
                };
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await
                    {
                        Ok(Ok(tls_stream)) => {
                            let hyper_service =
                                hyper_util::service::TowerToHyperService::new(service);
                            if let Err(e) = hyper::server::conn::http1::Builder::new()
                                .serve_connection(
                                    hyper_util::rt::TokioIo::new(tls_stream),
                                    hyper_service,
                                )
                                .await
                            {
                                debug!(peer = %peer_addr.ip(), error = %e, "https connection error");
                            }
                        }
                        Ok(Err(e)) => {
                            debug!(peer = %peer_addr.ip(), error = %e, "tls handshake failed");
                        }
                        Err(_) => {
                            debug!(peer = %peer_addr.ip(), "tls handshake timed out");
                        }
                    }
                });
            }
            _ = cancel.cancelled() => {
                info!("export https listener shutting down");
                break;
            }
        }
    }
}

async fn handle_web_app() -> Response {
    (StatusCode::NOT_IMPLEMENTED, "not implemented\n").into_response()
}

async fn handle_export(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    counter!(EXPORT_REQUESTS_TOTAL).increment(1);

    if !state.config.clear_ingest_enabled {
        return (StatusCode::NOT_FOUND, "export disabled\n").into_response();
    }

    let conn = ConnData {
        src_ip: peer_addr.ip(),
        src_port: peer_addr.port(),
        is_tls: state.is_tls,
        method: "GET".to_owned(),
        path: "/export".to_owned(),
        host: headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned(),
    };

    if run_auth_pipeline(&conn, &state.authz) != AuthOutcome::Allow {
        debug!(peer = %conn.src_ip, "export request rejected by authorization pipeline");
        return (StatusCode::FORBIDDEN, "forbidden\n").into_response();
    }

    let tenant_id = match resolve_tenant(
        &state.auth_modes,
        &state.config.default_tenant_id,
        &state.config.pepper,
        state.keys.as_ref(),
        &headers,
        state.is_tls,
    )
    .await
    {
        Some(tenant) => tenant,
        None => {
            warn!(peer = %conn.src_ip, "export request without resolvable tenant");
            return (StatusCode::INTERNAL_SERVER_ERROR, "no tenant resolved\n").into_response();
        }
    };
    let tenant = match Uuid::parse_str(&tenant_id) {
        Ok(tenant) => tenant,
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "bad tenant id\n").into_response();
        }
    };

    let query = match parse_export_query(&params, state.config.max_rows) {
        Ok(query) => query,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response(),
    };

    let pipe = match GrepPipeline::compile(&query.grep1, &query.grep2, &query.grep3, query.color) {
        Ok(pipe) => pipe,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response(),
    };

    let Some(db) = state.db.clone() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "database not available\n").into_response();
    };

    let deadline = Duration::from_secs(if state.config.max_seconds > 0 {
        state.config.max_seconds
    } else {
        30
    });

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
    tokio::spawn(async move {
        match tokio::time::timeout(deadline, stream_rows(db, tenant, query, pipe, tx.clone())).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "export stream failed");
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
            }
            Err(_) => {
                debug!("export request hit deadline, truncating stream");
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// 행을 읽어 grep 파이프라인을 통과한 라인만 청크로 내보냅니다.
async fn stream_rows(
    db: Arc<Db>,
    tenant: Uuid,
    query: ExportQuery,
    pipe: GrepPipeline,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
) -> Result<(), ExportError> {
    let mut builder = build_export_sql(tenant, &query);
    let mut rows = builder.build().fetch(db.pool());

    let mut buffer = String::new();
    let mut written = 0usize;

    while let Some(row) = rows.next().await {
        let row = row.map_err(|e| ExportError::Upstream(e.to_string()))?;
        let raw: String = row
            .try_get("raw_line")
            .map_err(|e| ExportError::Upstream(e.to_string()))?;

        let line = raw.trim_end_matches(['\r', '\n']);
        if !pipe.matches(line) {
            continue;
        }

        if pipe.color_enabled() {
            buffer.push_str(&pipe.highlight(line));
        } else {
            buffer.push_str(line);
        }
        buffer.push('\n');
        written += 1;
        counter!(EXPORT_ROWS_STREAMED_TOTAL).increment(1);

        if written % FLUSH_EVERY_ROWS == 0 {
            let chunk = Bytes::from(std::mem::take(&mut buffer));
            if tx.send(Ok(chunk)).await.is_err() {
                // 클라이언트가 끊음
                return Ok(());
            }
        }
    }

    if !buffer.is_empty() {
        let _ = tx.send(Ok(Bytes::from(buffer))).await;
    }
    Ok(())
}

/// 익스포트 서비스 빌더
#[derive(Default)]
pub struct ExportServiceBuilder {
    config: Option<ExportServiceConfig>,
    db: Option<Arc<Db>>,
    keys: Option<Arc<dyn ApiKeyStore>>,
}

impl ExportServiceBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 서비스 설정을 지정합니다.
    pub fn config(mut self, config: ExportServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 쿼리에 사용할 DB 핸들을 연결합니다.
    pub fn db(mut self, db: Arc<Db>) -> Self {
        self.db = Some(db);
        self
    }

    /// `apikey` 인증 모드가 사용할 키 스토어를 연결합니다.
    pub fn api_key_store(mut self, keys: Arc<dyn ApiKeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// 설정을 검증하고 서비스를 생성합니다.
    pub fn build(self) -> Result<ExportService, ExportError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(ExportService {
            config: Arc::new(config),
            db: self.db,
            keys: self.keys,
            state: ServiceState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            bound_http: None,
            bound_https: None,
        })
    }
}
