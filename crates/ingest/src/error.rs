//! 인제스트 파이프라인 에러 타입
//!
//! [`IngestError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<IngestError> for HistonError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use histon_core::error::{HistonError, PipelineError};

/// 인제스트 도메인 에러
///
/// 리스너, TLS 설정, 스풀 I/O, 채널 통신 등 파이프라인 내부의
/// 에러 상황을 포괄합니다. 핫 패스의 프레임/인증/파싱 실패는 에러가
/// 아니라 드롭 카운터로 처리됩니다.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 리스너 바인드/수락 실패
    #[error("listener error: {transport}: {reason}")]
    Listener {
        /// 트랜스포트 종류 (raw, tls)
        transport: String,
        /// 실패 사유
        reason: String,
    },

    /// TLS 자료 로드 또는 핸드셰이크 설정 실패
    #[error("tls error: {0}")]
    Tls(String),

    /// 스풀 파일 열기/시딩 실패
    #[error("spool error: tenant {tenant_id}: {reason}")]
    Spool {
        /// 대상 테넌트
        tenant_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IngestError> for HistonError {
    fn from(err: IngestError) -> Self {
        HistonError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_error_display() {
        let err = IngestError::Listener {
            transport: "raw".to_owned(),
            reason: "address in use".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("raw"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn spool_error_display() {
        let err = IngestError::Spool {
            tenant_id: "t-1".to_owned(),
            reason: "permission denied".to_owned(),
        };
        assert!(err.to_string().contains("t-1"));
    }

    #[test]
    fn converts_to_histon_error() {
        let err = IngestError::Channel("receiver closed".to_owned());
        let histon_err: HistonError = err.into();
        assert!(matches!(histon_err, HistonError::Pipeline(_)));
    }
}
