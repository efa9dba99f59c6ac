//! 인제스트 파이프라인 설정
//!
//! [`IngestPipelineConfig`]는 core의 [`HistonConfig`](histon_core::HistonConfig)에서
//! 파생되는 런타임 설정입니다. 리스너가 참조하는 ACL은 이 단계에서
//! 미리 컴파일됩니다.

use std::time::Duration;

use histon_core::config::{AuthMode, HistonConfig};
use histon_core::net::CompiledAcl;

use crate::error::IngestError;

/// 리스너 하나의 런타임 설정
#[derive(Debug, Clone, Default)]
pub struct ListenerSettings {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub addr: String,
    /// 순서 있는 인증 모드 목록
    pub auth: Vec<AuthMode>,
    /// 수락 시점에 평가할 ACL (설정에서 참조한 경우에만)
    pub acl: Option<CompiledAcl>,
}

/// 인제스트 파이프라인 런타임 설정
#[derive(Debug, Clone)]
pub struct IngestPipelineConfig {
    /// 평문 TCP 리스너
    pub clear: ListenerSettings,
    /// TLS 리스너
    pub tls: ListenerSettings,
    /// TLS 인증서 경로 (tls 리스너 활성 시 필수)
    pub tls_cert_file: String,
    /// TLS 개인키 경로
    pub tls_key_file: String,
    /// 검증 워커 수
    pub validate_workers: usize,
    /// 단계 간 채널 깊이
    pub queue_depth: usize,
    /// 프레임 최대 크기 (바이트)
    pub max_line_bytes: usize,
    /// 리스너당 최대 동시 연결 수
    pub max_connections: usize,
    /// 테넌트 스풀 디렉토리
    pub spool_dir: String,
    /// N회 쓰기마다 fsync (0이면 비활성)
    pub spool_sync_every_n: u32,
    /// T마다 fsync (0이면 비활성)
    pub spool_sync_every: Duration,
    /// `none` 모드가 반환하는 기본 테넌트
    pub default_tenant_id: String,
    /// API 키 해시 pepper
    pub pepper: String,
}

impl Default for IngestPipelineConfig {
    fn default() -> Self {
        Self {
            clear: ListenerSettings {
                enabled: true,
                addr: "127.0.0.1:7010".to_owned(),
                auth: vec![AuthMode::None],
                acl: None,
            },
            tls: ListenerSettings::default(),
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            validate_workers: 8,
            queue_depth: 10_000,
            max_line_bytes: 16 * 1024,
            max_connections: 256,
            spool_dir: "./spool".to_owned(),
            spool_sync_every_n: 64,
            spool_sync_every: Duration::from_secs(2),
            default_tenant_id: String::new(),
            pepper: String::new(),
        }
    }
}

impl IngestPipelineConfig {
    /// core 설정에서 파이프라인 설정을 만듭니다.
    ///
    /// 리스너가 참조하는 ACL을 컴파일하며, 참조가 깨져 있으면 에러입니다.
    pub fn from_core(config: &HistonConfig) -> Result<Self, IngestError> {
        let compile_acl = |name: &str, acl_id: &str| -> Result<Option<CompiledAcl>, IngestError> {
            if acl_id.is_empty() {
                return Ok(None);
            }
            let acl = config.acl_by_id(acl_id).ok_or_else(|| IngestError::Config {
                field: format!("{name}.acl"),
                reason: format!("unknown acl id '{acl_id}'"),
            })?;
            CompiledAcl::compile(acl)
                .map(Some)
                .map_err(|e| IngestError::Config {
                    field: format!("{name}.acl"),
                    reason: e.to_string(),
                })
        };

        Ok(Self {
            clear: ListenerSettings {
                enabled: config.ingest.clear.enabled,
                addr: config.ingest.clear.addr.clone(),
                auth: config.ingest.clear.auth.clone(),
                acl: compile_acl("ingest.clear", &config.ingest.clear.acl)?,
            },
            tls: ListenerSettings {
                enabled: config.ingest.tls.enabled,
                addr: config.ingest.tls.addr.clone(),
                auth: config.ingest.tls.auth.clone(),
                acl: compile_acl("ingest.tls", &config.ingest.tls.acl)?,
            },
            tls_cert_file: config.tls.cert_file.clone(),
            tls_key_file: config.tls.key_file.clone(),
            validate_workers: config.ingest.validate_workers,
            queue_depth: config.ingest.queue_depth,
            max_line_bytes: config.globals.max_line_bytes,
            max_connections: config.ingest.max_connections,
            spool_dir: config.ingest.spool_dir.clone(),
            spool_sync_every_n: config.ingest.spool_sync_every_n,
            spool_sync_every: Duration::from_secs(config.ingest.spool_sync_every_secs),
            default_tenant_id: config.globals.default_tenant_id.clone(),
            pepper: config.globals.pepper.clone(),
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        let invalid = |field: &str, reason: &str| IngestError::Config {
            field: field.to_owned(),
            reason: reason.to_owned(),
        };

        if !self.clear.enabled && !self.tls.enabled {
            return Err(invalid("ingest", "no listeners enabled (clear/tls)"));
        }
        if self.clear.enabled && self.clear.addr.trim().is_empty() {
            return Err(invalid("ingest.clear.addr", "required when enabled"));
        }
        if self.tls.enabled {
            if self.tls.addr.trim().is_empty() {
                return Err(invalid("ingest.tls.addr", "required when enabled"));
            }
            if self.tls_cert_file.is_empty() || self.tls_key_file.is_empty() {
                return Err(invalid(
                    "tls",
                    "cert_file and key_file required for the tls listener",
                ));
            }
        }
        if self.validate_workers == 0 {
            return Err(invalid("ingest.validate_workers", "must be > 0"));
        }
        if self.queue_depth == 0 {
            return Err(invalid("ingest.queue_depth", "must be > 0"));
        }
        if self.max_line_bytes == 0 {
            return Err(invalid("globals.max_line_bytes", "must be > 0"));
        }
        if self.max_connections == 0 {
            return Err(invalid("ingest.max_connections", "must be > 0"));
        }
        if self.spool_dir.trim().is_empty() {
            return Err(invalid("ingest.spool_dir", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histon_core::config::ListenerConfig;
    use histon_core::net::{Acl, AclAction, AclRule};

    #[test]
    fn default_config_is_valid() {
        IngestPipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_no_listeners() {
        let config = IngestPipelineConfig {
            clear: ListenerSettings::default(),
            tls: ListenerSettings::default(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tls_listener_needs_cert_material() {
        let config = IngestPipelineConfig {
            clear: ListenerSettings::default(),
            tls: ListenerSettings {
                enabled: true,
                addr: "127.0.0.1:7011".to_owned(),
                auth: vec![AuthMode::ApiKey],
                acl: None,
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_file"));
    }

    #[test]
    fn from_core_compiles_listener_acl() {
        let core = HistonConfig {
            ingest: histon_core::config::IngestConfig {
                clear: ListenerConfig {
                    enabled: true,
                    addr: "127.0.0.1:7010".to_owned(),
                    auth: vec![AuthMode::None],
                    acl: "office".to_owned(),
                },
                ..Default::default()
            },
            acl: vec![Acl {
                id: "office".to_owned(),
                rules: vec![AclRule {
                    cidr: "10.0.0.0/8".to_owned(),
                    action: AclAction::Allow,
                    name: "internal".to_owned(),
                }],
            }],
            ..Default::default()
        };

        let config = IngestPipelineConfig::from_core(&core).unwrap();
        let acl = config.clear.acl.expect("acl must be compiled");
        assert!(acl.permits("10.1.2.3".parse().unwrap()));
        assert!(!acl.permits("192.168.0.1".parse().unwrap()));
    }

    #[test]
    fn from_core_rejects_dangling_acl_reference() {
        let core = HistonConfig {
            ingest: histon_core::config::IngestConfig {
                clear: ListenerConfig {
                    enabled: true,
                    addr: "127.0.0.1:7010".to_owned(),
                    auth: vec![AuthMode::None],
                    acl: "missing".to_owned(),
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let err = IngestPipelineConfig::from_core(&core).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn from_core_carries_globals() {
        let mut core = HistonConfig::default();
        core.globals.max_line_bytes = 4096;
        core.globals.default_tenant_id = "t-1".to_owned();
        core.ingest.spool_sync_every_secs = 7;
        let config = IngestPipelineConfig::from_core(&core).unwrap();
        assert_eq!(config.max_line_bytes, 4096);
        assert_eq!(config.default_tenant_id, "t-1");
        assert_eq!(config.spool_sync_every, Duration::from_secs(7));
    }
}
