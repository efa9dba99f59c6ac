//! 설정 관리 — histon.toml 파싱 및 검증
//!
//! [`HistonConfig::load`]가 TOML 파일을 읽고, [`HistonConfig::validate`]가
//! 필드 단위 경로를 포함한 에러로 fail-fast 검증합니다. 유효하지 않은
//! 설정으로 기동하면 프로세스는 종료 코드 2로 끝납니다.
//!
//! 기동 이후에는 어떤 설정도 변경되지 않습니다 (no global mutable config).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::net::{Acl, CompiledAcl};

/// Histon 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistonConfig {
    /// 일반 설정 (로깅, PID 파일)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 전역 한계값과 공용 비밀
    #[serde(default)]
    pub globals: GlobalsConfig,
    /// 인제스트 파이프라인 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 익스포트 서비스 설정
    #[serde(default)]
    pub export: ExportConfig,
    /// TLS 인증서 설정
    #[serde(default)]
    pub tls: TlsConfig,
    /// 데이터베이스 설정
    #[serde(default)]
    pub db: DbConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 이름 붙은 CIDR ACL 목록
    #[serde(default)]
    pub acl: Vec<Acl>,
    /// 테넌트 목록
    #[serde(default)]
    pub tenant: Vec<TenantConfig>,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// 로그 레벨 (EnvFilter 기본값, RUST_LOG로 재정의 가능)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 미사용)
    #[serde(default)]
    pub pid_file: String,
}

/// 전역 한계값
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalsConfig {
    /// 인제스트 프레임 최대 크기 (바이트)
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// 익스포트 응답 최대 행 수
    #[serde(default = "default_max_rows")]
    pub max_rows: i64,
    /// 익스포트 요청 데드라인 (초)
    #[serde(default = "default_max_seconds")]
    pub max_seconds: u64,
    /// `none` 인증 모드가 반환하는 기본 테넌트 (빈 문자열 ⇒ 매칭 없음)
    #[serde(default)]
    pub default_tenant_id: String,
    /// API 키 해시에 섞는 서버측 비밀
    #[serde(default)]
    pub pepper: String,
}

/// 인증 모드
///
/// 트랜스포트별 ordered list로 설정되며, 순서대로 시도해
/// 첫 번째로 테넌트를 돌려주는 모드가 승리합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// 기본 테넌트 반환
    None,
    /// TLS 피어 인증서 (이번 리비전에서는 스텁)
    Cert,
    /// payload 또는 Authorization 헤더의 API 키
    ApiKey,
}

impl AuthMode {
    /// 설정 파일에 쓰이는 문자열 표현을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Cert => "cert",
            Self::ApiKey => "apikey",
        }
    }
}

/// 단일 리스너/엔드포인트 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// 활성화 여부
    #[serde(default)]
    pub enabled: bool,
    /// 바인드 주소 (예: "0.0.0.0:7010")
    #[serde(default)]
    pub addr: String,
    /// 순서 있는 인증 모드 목록
    #[serde(default)]
    pub auth: Vec<AuthMode>,
    /// 수신 허용 여부를 평가할 ACL id (빈 문자열이면 필터 없음)
    #[serde(default)]
    pub acl: String,
}

/// 인제스트 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// 평문 TCP 리스너
    #[serde(default)]
    pub clear: ListenerConfig,
    /// TLS 리스너
    #[serde(default)]
    pub tls: ListenerConfig,
    /// 검증 워커 수
    #[serde(default = "default_validate_workers")]
    pub validate_workers: usize,
    /// DB 작성기 워커 수
    #[serde(default = "default_db_workers")]
    pub db_workers: usize,
    /// 단계 간 채널 깊이
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// 테넌트 스풀 디렉토리
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
    /// N회 쓰기마다 fsync (0이면 비활성)
    #[serde(default = "default_spool_sync_every_n")]
    pub spool_sync_every_n: u32,
    /// T초마다 fsync (0이면 비활성)
    #[serde(default = "default_spool_sync_every_secs")]
    pub spool_sync_every_secs: u64,
    /// 리스너당 최대 동시 연결 수
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// 익스포트 서비스 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// 평문 HTTP 엔드포인트
    #[serde(default)]
    pub http: ListenerConfig,
    /// HTTPS 엔드포인트
    #[serde(default)]
    pub https: ListenerConfig,
}

/// TLS 인증서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM 인증서 체인 경로
    #[serde(default)]
    pub cert_file: String,
    /// PEM 개인키 경로
    #[serde(default)]
    pub key_file: String,
}

/// 데이터베이스 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    /// PostgreSQL DSN (빈 문자열이면 스풀 전용 모드)
    #[serde(default)]
    pub postgres_dsn: String,
    /// true면 DB 연결 실패 시 기동을 거부
    #[serde(default)]
    pub required: bool,
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// 활성화 여부
    #[serde(default)]
    pub enabled: bool,
    /// 리슨 주소
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
    /// 리슨 포트
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// 테넌트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    /// 테넌트 UUID
    pub id: String,
    /// 사람이 읽는 이름 (DB `tenants.name`과 일치)
    pub name: String,
    /// 참조하는 ACL id
    #[serde(default)]
    pub acl: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}
fn default_log_format() -> String {
    "json".to_owned()
}
fn default_max_line_bytes() -> usize {
    16 * 1024
}
fn default_max_rows() -> i64 {
    200_000
}
fn default_max_seconds() -> u64 {
    30
}
fn default_validate_workers() -> usize {
    8
}
fn default_db_workers() -> usize {
    4
}
fn default_queue_depth() -> usize {
    10_000
}
fn default_spool_dir() -> String {
    "./spool".to_owned()
}
fn default_spool_sync_every_n() -> u32 {
    64
}
fn default_spool_sync_every_secs() -> u64 {
    2
}
fn default_max_connections() -> usize {
    256
}
fn default_metrics_addr() -> String {
    "127.0.0.1".to_owned()
}
fn default_metrics_port() -> u16 {
    9598
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            pid_file: String::new(),
        }
    }
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
            max_rows: default_max_rows(),
            max_seconds: default_max_seconds(),
            default_tenant_id: String::new(),
            pepper: String::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            clear: ListenerConfig::default(),
            tls: ListenerConfig::default(),
            validate_workers: default_validate_workers(),
            db_workers: default_db_workers(),
            queue_depth: default_queue_depth(),
            spool_dir: default_spool_dir(),
            spool_sync_every_n: default_spool_sync_every_n(),
            spool_sync_every_secs: default_spool_sync_every_secs(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
            port: default_metrics_port(),
        }
    }
}

impl HistonConfig {
    /// TOML 설정 파일을 읽고 파싱합니다. 검증은 하지 않습니다.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// 설정값의 유효성을 검증합니다 (fail-fast).
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_QUEUE_DEPTH: usize = 1_000_000;
        const MAX_WORKERS: usize = 1024;

        let invalid = |field: &str, reason: String| ConfigError::InvalidValue {
            field: field.to_owned(),
            reason,
        };

        // general
        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(invalid(
                    "general.log_format",
                    format!("expected 'json' or 'pretty', got '{other}'"),
                ));
            }
        }

        // globals
        if self.globals.max_line_bytes == 0 {
            return Err(invalid("globals.max_line_bytes", "must be > 0".to_owned()));
        }
        if self.globals.max_rows <= 0 {
            return Err(invalid("globals.max_rows", "must be > 0".to_owned()));
        }
        if self.globals.max_seconds == 0 {
            return Err(invalid("globals.max_seconds", "must be > 0".to_owned()));
        }
        if !self.globals.default_tenant_id.is_empty()
            && Uuid::parse_str(&self.globals.default_tenant_id).is_err()
        {
            return Err(invalid(
                "globals.default_tenant_id",
                format!("not a valid UUID: '{}'", self.globals.default_tenant_id),
            ));
        }

        // acl: id 중복 및 규칙 파싱
        let mut acl_ids = HashSet::new();
        for acl in &self.acl {
            if acl.id.is_empty() {
                return Err(invalid("acl.id", "must not be empty".to_owned()));
            }
            if !acl_ids.insert(acl.id.as_str()) {
                return Err(invalid("acl.id", format!("duplicate acl id '{}'", acl.id)));
            }
            CompiledAcl::compile(acl)?;
        }

        // tenants
        let mut tenant_ids = HashSet::new();
        for (i, tenant) in self.tenant.iter().enumerate() {
            if Uuid::parse_str(&tenant.id).is_err() {
                return Err(invalid(
                    &format!("tenant[{i}].id"),
                    format!("not a valid UUID: '{}'", tenant.id),
                ));
            }
            if !tenant_ids.insert(tenant.id.as_str()) {
                return Err(invalid(
                    &format!("tenant[{i}].id"),
                    format!("duplicate tenant id '{}'", tenant.id),
                ));
            }
            if tenant.name.is_empty() {
                return Err(invalid(
                    &format!("tenant[{i}].name"),
                    "must not be empty".to_owned(),
                ));
            }
            if !tenant.acl.is_empty() && !acl_ids.contains(tenant.acl.as_str()) {
                return Err(invalid(
                    &format!("tenant[{i}].acl"),
                    format!("references unknown acl id '{}'", tenant.acl),
                ));
            }
        }

        // listeners
        self.validate_listener("ingest.clear", &self.ingest.clear, &acl_ids)?;
        self.validate_listener("ingest.tls", &self.ingest.tls, &acl_ids)?;
        self.validate_listener("export.http", &self.export.http, &acl_ids)?;
        self.validate_listener("export.https", &self.export.https, &acl_ids)?;

        // ingest 파이프라인 수치
        if self.ingest.validate_workers == 0 || self.ingest.validate_workers > MAX_WORKERS {
            return Err(invalid(
                "ingest.validate_workers",
                format!("must be 1-{MAX_WORKERS}"),
            ));
        }
        if self.ingest.db_workers == 0 || self.ingest.db_workers > MAX_WORKERS {
            return Err(invalid("ingest.db_workers", format!("must be 1-{MAX_WORKERS}")));
        }
        if self.ingest.queue_depth == 0 || self.ingest.queue_depth > MAX_QUEUE_DEPTH {
            return Err(invalid(
                "ingest.queue_depth",
                format!("must be 1-{MAX_QUEUE_DEPTH}"),
            ));
        }
        if self.ingest.spool_dir.is_empty() {
            return Err(invalid("ingest.spool_dir", "must not be empty".to_owned()));
        }
        if self.ingest.max_connections == 0 {
            return Err(invalid("ingest.max_connections", "must be > 0".to_owned()));
        }

        // TLS 자료는 TLS 리스너가 하나라도 켜져 있을 때만 필수
        if self.ingest.tls.enabled || self.export.https.enabled {
            if self.tls.cert_file.is_empty() {
                return Err(invalid(
                    "tls.cert_file",
                    "required when a TLS listener is enabled".to_owned(),
                ));
            }
            if self.tls.key_file.is_empty() {
                return Err(invalid(
                    "tls.key_file",
                    "required when a TLS listener is enabled".to_owned(),
                ));
            }
        }

        // apikey 모드를 쓰려면 pepper가 있어야 검증이 가능
        let uses_apikey = [
            &self.ingest.clear,
            &self.ingest.tls,
            &self.export.http,
            &self.export.https,
        ]
        .iter()
        .any(|l| l.enabled && l.auth.contains(&AuthMode::ApiKey));
        if uses_apikey && self.globals.pepper.trim().is_empty() {
            return Err(invalid(
                "globals.pepper",
                "required when an 'apikey' auth mode is configured".to_owned(),
            ));
        }

        // DB
        if self.db.required && self.db.postgres_dsn.trim().is_empty() {
            return Err(invalid(
                "db.postgres_dsn",
                "required when db.required = true".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_listener(
        &self,
        name: &str,
        listener: &ListenerConfig,
        acl_ids: &HashSet<&str>,
    ) -> Result<(), ConfigError> {
        if !listener.enabled {
            return Ok(());
        }
        if listener.addr.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{name}.addr"),
                reason: "required when enabled".to_owned(),
            });
        }
        if listener.auth.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{name}.auth"),
                reason: "must not be empty when enabled (an empty list denies everything)"
                    .to_owned(),
            });
        }
        if !listener.acl.is_empty() && !acl_ids.contains(listener.acl.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: format!("{name}.acl"),
                reason: format!("references unknown acl id '{}'", listener.acl),
            });
        }
        Ok(())
    }

    /// id로 ACL을 찾습니다.
    pub fn acl_by_id(&self, id: &str) -> Option<&Acl> {
        self.acl.iter().find(|a| a.id == id)
    }

    /// id로 테넌트를 찾습니다.
    pub fn tenant_by_id(&self, id: &str) -> Option<&TenantConfig> {
        self.tenant.iter().find(|t| t.id == id)
    }
}
