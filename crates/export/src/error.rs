//! 익스포트 서비스 에러 타입

use histon_core::error::{HistonError, PipelineError};

/// 익스포트 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// 클라이언트 쿼리 오류 (4xx로 응답)
    #[error("bad request: {0}")]
    BadQuery(String),

    /// 리스너 바인드 실패
    #[error("listener error: {0}")]
    Listener(String),

    /// TLS 설정 실패
    #[error("tls error: {0}")]
    Tls(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 업스트림(DB) 실패 (5xx로 응답)
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<ExportError> for HistonError {
    fn from(err: ExportError) -> Self {
        HistonError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
