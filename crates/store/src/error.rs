//! 스토어 에러 타입

use histon_core::error::{HistonError, StorageError};

/// 스토리지 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 연결/풀 생성 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 테넌트가 tenants 테이블에 없음
    #[error("tenant not found: {tenant_id}")]
    TenantNotFound {
        /// 조회한 테넌트 ID
        tenant_id: String,
    },

    /// key_id 충돌이 재시도 후에도 해소되지 않음
    #[error("failed to generate unique key_id after retries")]
    KeyIdCollision,

    /// 임포트 파일 I/O 실패
    #[error("import io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::Connection(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(reason) => StorageError::Connection(reason),
            other => StorageError::Query(other.to_string()),
        }
    }
}

impl From<StoreError> for HistonError {
    fn from(err: StoreError) -> Self {
        HistonError::Storage(err.into())
    }
}

/// unique 제약 위반인지 확인합니다 (key_id 충돌 재시도용).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_maps_to_storage_error() {
        let err: StorageError = StoreError::Connection("refused".to_owned()).into();
        assert!(matches!(err, StorageError::Connection(_)));

        let err: StorageError = StoreError::Query("syntax".to_owned()).into();
        assert!(matches!(err, StorageError::Query(_)));
    }

    #[test]
    fn tenant_not_found_display() {
        let err = StoreError::TenantNotFound {
            tenant_id: "t-9".to_owned(),
        };
        assert!(err.to_string().contains("t-9"));
    }

    #[test]
    fn histon_error_wraps_storage() {
        let err: HistonError = StoreError::Query("boom".to_owned()).into();
        assert!(matches!(err, HistonError::Storage(_)));
    }
}
