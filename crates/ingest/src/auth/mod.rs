//! 테넌트 해석 -- 트랜스포트별 인증 모드 목록을 순서대로 평가합니다.
//!
//! 모드는 `none` / `cert` / `apikey` 중에서 설정되며, 첫 번째로
//! 비어 있지 않은 테넌트 ID를 돌려주는 모드가 승리합니다. 어떤 모드도
//! 매칭되지 않으면 메시지는 거부됩니다. 빈 모드 목록은 무조건 거부입니다.
//!
//! `apikey` 모드는 성공 시 라인에서 토큰과 선행 구분자를 제거하는
//! 명시적 부수효과를 가집니다 (토큰은 영구 저장되지 않습니다).

pub mod token;

use std::sync::Arc;

use tracing::{debug, warn};

use histon_core::config::AuthMode;
use histon_core::credential;
use histon_core::event::RawMessage;
use histon_core::storage::ApiKeyStore;

pub use token::{extract_token_from_payload, separate_payload_strict};

/// 인제스트 메시지의 테넌트 해석기
///
/// 리스너(트랜스포트)마다 하나씩 만들어지며, 설정된 모드 목록과
/// 기본 테넌트, pepper, API 키 스토어를 캡처합니다.
pub struct TenantResolver {
    modes: Vec<AuthMode>,
    default_tenant_id: String,
    pepper: String,
    keys: Option<Arc<dyn ApiKeyStore>>,
}

impl TenantResolver {
    /// 새 해석기를 생성합니다.
    pub fn new(
        modes: Vec<AuthMode>,
        default_tenant_id: impl Into<String>,
        pepper: impl Into<String>,
        keys: Option<Arc<dyn ApiKeyStore>>,
    ) -> Self {
        Self {
            modes,
            default_tenant_id: default_tenant_id.into(),
            pepper: pepper.into(),
            keys,
        }
    }

    /// 설정된 모드를 순서대로 시도해 테넌트 ID를 해석합니다.
    ///
    /// `apikey` 모드 성공 시 `msg.line`이 토큰이 제거된 형태로
    /// 재작성됩니다. 해석 실패는 `None`입니다.
    pub async fn resolve(&self, msg: &mut RawMessage) -> Option<String> {
        for mode in &self.modes {
            match mode {
                AuthMode::None => {
                    let tenant = self.default_tenant_id.trim();
                    if !tenant.is_empty() {
                        debug!(transport = %msg.transport, "resolved via default tenant");
                        return Some(tenant.to_owned());
                    }
                }
                AuthMode::ApiKey => {
                    if let Some(tenant) = self.resolve_api_key(msg).await {
                        debug!(transport = %msg.transport, "resolved via api key");
                        return Some(tenant);
                    }
                }
                AuthMode::Cert => {
                    // TLS 피어 인증서 매핑은 이번 리비전에서 아무것도 수락하지 않음
                    debug!(transport = %msg.transport, "cert mode configured but not implemented");
                }
            }
        }
        None
    }

    /// 엄격 라인의 payload에서 API 키를 추출해 검증합니다.
    ///
    /// 성공 시에만 라인을 재작성합니다.
    async fn resolve_api_key(&self, msg: &mut RawMessage) -> Option<String> {
        let keys = self.keys.as_ref()?;

        let (payload, rest) = token::separate_payload_strict(&msg.line)?;
        let (token, cleaned) = token::extract_token_from_payload(&payload)?;

        let (key_id, secret) = credential::split_token(&token)?;
        if !credential::key_id_is_valid(key_id) {
            debug!("api key token has malformed key id");
            return None;
        }
        if !credential::secret_len_is_valid(secret) {
            debug!("api key secret length out of range");
            return None;
        }

        let record = match keys.lookup_key(key_id).await {
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
        if !credential::verify_secret(secret, self.pepper.trim(), &record.key_hash) {
            debug!(key_id, "api key verification failed");
            return None;
        }

        // 토큰이 영구 저장되지 않도록 라인을 재작성
        msg.line = format!("{rest}{cleaned}");

        let tenant = record.tenant_id.trim();
        if tenant.is_empty() {
            return None;
        }
        Some(tenant.to_owned())
    }
}

/// 트랜스포트별 해석기 묶음
///
/// 검증 워커 풀은 트랜스포트를 가리지 않고 rawQ를 소비하므로,
/// 메시지의 트랜스포트에 맞는 해석기로 디스패치합니다.
pub struct ResolverSet {
    raw: TenantResolver,
    tls: TenantResolver,
}

impl ResolverSet {
    /// 트랜스포트별 해석기로 묶음을 만듭니다.
    pub fn new(raw: TenantResolver, tls: TenantResolver) -> Self {
        Self { raw, tls }
    }

    /// 메시지의 트랜스포트에 해당하는 해석기로 테넌트를 해석합니다.
    pub async fn resolve(&self, msg: &mut RawMessage) -> Option<String> {
        use histon_core::event::Transport;
        match msg.transport {
            Transport::Raw => self.raw.resolve(msg).await,
            Transport::Tls => self.tls.resolve(msg).await,
            // 임포트 경로는 리스너를 거치지 않음
            Transport::Import => None,
        }
    }
}
