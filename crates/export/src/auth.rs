//! 익스포트 인가와 테넌트 해석
//!
//! 요청 처리 전에 연결 기술자([`ConnData`])를 만들고 인가 파이프라인을
//! 실행합니다. 파이프라인은 순서 있는 검사 함수 목록으로, 각 검사는
//! `NoMatch` / `Allow` / `Deny`를 반환하고 첫 번째 non-`NoMatch`가
//! 결과를 결정합니다. 빈 목록은 거부입니다.
//!
//! 테넌트 해석은 인제스트와 같은 모드 목록을 사용하되, `apikey`는
//! `Authorization: Bearer <key_id>.<secret>` 헤더에서 읽습니다.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use histon_core::config::AuthMode;
use histon_core::credential;
use histon_core::net::CompiledAcl;
use histon_core::storage::ApiKeyStore;

/// 인가 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// 이 검사는 판단하지 않음, 다음 검사로
    NoMatch,
    /// 허용
    Allow,
    /// 거부
    Deny,
}

/// 요청에서 추출한 연결 기술자
#[derive(Debug, Clone)]
pub struct ConnData {
    /// 송신 피어 IP
    pub src_ip: IpAddr,
    /// 송신 피어 포트
    pub src_port: u16,
    /// TLS 여부
    pub is_tls: bool,
    /// HTTP 메서드
    pub method: String,
    /// 요청 경로
    pub path: String,
    /// Host 헤더 (TLS면 SNI 자리)
    pub host: String,
}

/// 인가 검사 함수
pub type AuthCheck = Arc<dyn Fn(&ConnData) -> AuthOutcome + Send + Sync>;

/// 인가 파이프라인을 실행합니다.
///
/// 빈 목록은 거부, 모든 검사가 `NoMatch`여도 거부입니다.
pub fn run_auth_pipeline(conn: &ConnData, checks: &[AuthCheck]) -> AuthOutcome {
    if checks.is_empty() {
        return AuthOutcome::Deny;
    }
    for check in checks {
        match check(conn) {
            AuthOutcome::Allow => return AuthOutcome::Allow,
            AuthOutcome::Deny => return AuthOutcome::Deny,
            AuthOutcome::NoMatch => continue,
        }
    }
    AuthOutcome::Deny
}

/// 피어 IP를 ACL로 평가하는 검사를 만듭니다.
pub fn acl_check(acl: Arc<CompiledAcl>) -> AuthCheck {
    Arc::new(move |conn: &ConnData| {
        if acl.permits(conn.src_ip) {
            AuthOutcome::Allow
        } else {
            AuthOutcome::Deny
        }
    })
}

/// 무조건 허용 검사를 만듭니다 (ACL이 설정되지 않은 엔드포인트용).
pub fn allow_all() -> AuthCheck {
    Arc::new(|_conn: &ConnData| AuthOutcome::Allow)
}

/// `Authorization` 헤더 값에서 bearer API 키를 파싱합니다.
///
/// `bearer` 접두어는 대소문자를 무시하고, 토큰은 첫 `.` 기준으로
/// `(key_id, secret)`으로 나뉩니다.
pub fn parse_bearer_api_key(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let rest = value
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("bearer "))
        .map(|_| value[7..].trim())?;
    let (key_id, secret) = credential::split_token(rest)?;
    Some((key_id.to_owned(), secret.to_owned()))
}

/// 엔드포인트의 모드 목록으로 테넌트를 해석합니다.
///
/// 첫 번째로 비어 있지 않은 테넌트를 돌려주는 모드가 승리합니다.
pub async fn resolve_tenant(
    modes: &[AuthMode],
    default_tenant_id: &str,
    pepper: &str,
    keys: Option<&Arc<dyn ApiKeyStore>>,
    headers: &HeaderMap,
    is_tls: bool,
) -> Option<String> {
    for mode in modes {
        match mode {
            AuthMode::None => {
                let tenant = default_tenant_id.trim();
                if !tenant.is_empty() {
                    debug!("export tenant resolved via default");
                    return Some(tenant.to_owned());
                }
            }
            AuthMode::ApiKey => {
                if !is_tls {
                    warn!("apikey auth used on a cleartext export endpoint");
                }
                if let Some(tenant) = resolve_bearer(pepper, keys, headers).await {
                    debug!("export tenant resolved via api key");
                    return Some(tenant);
                }
            }
            AuthMode::Cert => {
                debug!("cert mode configured but not implemented");
            }
        }
    }
    None
}

async fn resolve_bearer(
    pepper: &str,
    keys: Option<&Arc<dyn ApiKeyStore>>,
    headers: &HeaderMap,
) -> Option<String> {
    let keys = keys?;
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (key_id, secret) = parse_bearer_api_key(header)?;

    let record = match keys.lookup_key(&key_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!(key_id, "api key not found");
            return None;
        }
        Err(e) => {
            warn!(key_id, error = %e, "api key lookup failed");
            return None;
        }
    };

    if record.revoked {
        debug!(key_id, "api key revoked");
        return None;
    }
    if !credential::verify_secret(&secret, pepper.trim(), &record.key_hash) {
        debug!(key_id, "api key verification failed");
        return None;
    }

    let tenant = record.tenant_id.trim();
    if tenant.is_empty() {
        return None;
    }
    Some(tenant.to_owned())
}
