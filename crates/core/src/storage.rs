//! 스토리지 seam trait — DB 의존 모듈의 테스트 가능 경계
//!
//! 인제스트 파이프라인은 시퀀스 시딩과 API 키 검증을 위해 DB를 조회해야
//! 하지만, DB 구현(`histon-store`)에 직접 의존하면 단위 테스트마다
//! PostgreSQL이 필요해집니다. 이 trait들이 그 경계를 추상화하며,
//! 실제 구현은 `histon-store`의 `Db`가 제공합니다.

use crate::error::StorageError;
use crate::pipeline::BoxFuture;

/// `api_keys` 테이블의 조회 결과 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    /// 키가 속한 테넌트 ID (UUID 텍스트)
    pub tenant_id: String,
    /// sha256(secret ":" pepper)의 16진 표현
    pub key_hash: String,
    /// 폐기 여부 (`revoked_at`이 non-null이면 true)
    pub revoked: bool,
}

/// 테넌트별 최대 시퀀스 조회
///
/// 스풀러가 테넌트 스풀을 처음 열 때 초기 시퀀스 시딩에 사용합니다.
pub trait SequenceStore: Send + Sync {
    /// `max(seq)`를 조회합니다. 행이 없으면 0을 반환합니다.
    fn max_seq<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, Result<i64, StorageError>>;
}

/// API 키 조회
///
/// 인제스트 payload 인증과 익스포트 bearer 인증이 공유합니다.
pub trait ApiKeyStore: Send + Sync {
    /// `key_id`로 키 레코드를 조회합니다. 키가 없으면 `None`입니다.
    ///
    /// 구현은 2초 타임아웃을 적용해야 합니다.
    fn lookup_key<'a>(
        &'a self,
        key_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ApiKeyRecord>, StorageError>>;
}
