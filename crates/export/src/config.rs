//! 익스포트 서비스 설정

use histon_core::config::{AuthMode, HistonConfig};
use histon_core::net::CompiledAcl;

use crate::error::ExportError;

/// 엔드포인트 하나의 런타임 설정
#[derive(Debug, Clone, Default)]
pub struct EndpointSettings {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub addr: String,
    /// 순서 있는 인증 모드 목록
    pub auth: Vec<AuthMode>,
    /// 인가 파이프라인에 쓸 ACL (설정에서 참조한 경우에만)
    pub acl: Option<CompiledAcl>,
}

/// 익스포트 서비스 런타임 설정
#[derive(Debug, Clone)]
pub struct ExportServiceConfig {
    /// 평문 HTTP 엔드포인트
    pub http: EndpointSettings,
    /// HTTPS 엔드포인트
    pub https: EndpointSettings,
    /// TLS 인증서 경로 (https 활성 시 필수)
    pub tls_cert_file: String,
    /// TLS 개인키 경로
    pub tls_key_file: String,
    /// `none` 모드가 반환하는 기본 테넌트
    pub default_tenant_id: String,
    /// API 키 해시 pepper
    pub pepper: String,
    /// 응답 최대 행 수
    pub max_rows: i64,
    /// 요청 데드라인 (초)
    pub max_seconds: u64,
    /// 평문 인제스트 리스너 활성 여부 (`/export` 게이트)
    pub clear_ingest_enabled: bool,
}

impl Default for ExportServiceConfig {
    fn default() -> Self {
        Self {
            http: EndpointSettings {
                enabled: true,
                addr: "127.0.0.1:7080".to_owned(),
                auth: vec![AuthMode::None],
                acl: None,
            },
            https: EndpointSettings::default(),
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            default_tenant_id: String::new(),
            pepper: String::new(),
            max_rows: 200_000,
            max_seconds: 30,
            clear_ingest_enabled: true,
        }
    }
}

impl ExportServiceConfig {
    /// core 설정에서 서비스 설정을 만듭니다.
    pub fn from_core(config: &HistonConfig) -> Result<Self, ExportError> {
        let compile_acl = |name: &str, acl_id: &str| -> Result<Option<CompiledAcl>, ExportError> {
            if acl_id.is_empty() {
                return Ok(None);
            }
            let acl = config.acl_by_id(acl_id).ok_or_else(|| ExportError::Config {
                field: format!("{name}.acl"),
                reason: format!("unknown acl id '{acl_id}'"),
            })?;
            CompiledAcl::compile(acl)
                .map(Some)
                .map_err(|e| ExportError::Config {
                    field: format!("{name}.acl"),
                    reason: e.to_string(),
                })
        };

        Ok(Self {
            http: EndpointSettings {
                enabled: config.export.http.enabled,
                addr: config.export.http.addr.clone(),
                auth: config.export.http.auth.clone(),
                acl: compile_acl("export.http", &config.export.http.acl)?,
            },
            https: EndpointSettings {
                enabled: config.export.https.enabled,
                addr: config.export.https.addr.clone(),
                auth: config.export.https.auth.clone(),
                acl: compile_acl("export.https", &config.export.https.acl)?,
            },
            tls_cert_file: config.tls.cert_file.clone(),
            tls_key_file: config.tls.key_file.clone(),
            default_tenant_id: config.globals.default_tenant_id.clone(),
            pepper: config.globals.pepper.clone(),
            max_rows: config.globals.max_rows,
            max_seconds: config.globals.max_seconds,
            clear_ingest_enabled: config.ingest.clear.enabled,
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ExportError> {
        let invalid = |field: &str, reason: &str| ExportError::Config {
            field: field.to_owned(),
            reason: reason.to_owned(),
        };

        if !self.http.enabled && !self.https.enabled {
            return Err(invalid("export", "no endpoints enabled (http/https)"));
        }
        if self.http.enabled && self.http.addr.trim().is_empty() {
            return Err(invalid("export.http.addr", "required when enabled"));
        }
        if self.https.enabled {
            if self.https.addr.trim().is_empty() {
                return Err(invalid("export.https.addr", "required when enabled"));
            }
            if self.tls_cert_file.is_empty() || self.tls_key_file.is_empty() {
                return Err(invalid(
                    "tls",
                    "cert_file and key_file required for the https endpoint",
                ));
            }
        }
        if self.max_rows <= 0 {
            return Err(invalid("globals.max_rows", "must be > 0"));
        }
        if self.max_seconds == 0 {
            return Err(invalid("globals.max_seconds", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ExportServiceConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_no_endpoints() {
        let config = ExportServiceConfig {
            http: EndpointSettings::default(),
            https: EndpointSettings::default(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn https_needs_cert_material() {
        let config = ExportServiceConfig {
            http: EndpointSettings::default(),
            https: EndpointSettings {
                enabled: true,
                addr: "127.0.0.1:7443".to_owned(),
                auth: vec![AuthMode::ApiKey],
                acl: None,
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_file"));
    }

    #[test]
    fn from_core_carries_globals_and_gate() {
        let mut core = HistonConfig::default();
        core.export.http.enabled = true;
        core.export.http.addr = "0.0.0.0:8080".to_owned();
        core.export.http.auth = vec![AuthMode::ApiKey];
        core.globals.max_rows = 500;
        core.ingest.clear.enabled = true;
        let config = ExportServiceConfig::from_core(&core).unwrap();
        assert_eq!(config.max_rows, 500);
        assert!(config.clear_ingest_enabled);
        assert_eq!(config.http.auth, vec![AuthMode::ApiKey]);
    }
}
