//! 스토어 설정

use histon_core::config::HistonConfig;

use crate::error::StoreError;

/// 스토어 런타임 설정
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL DSN (빈 문자열이면 스풀 전용 모드)
    pub postgres_dsn: String,
    /// true면 DB 연결 실패가 기동 실패
    pub required: bool,
    /// DB 작성기 워커 수
    pub db_workers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            postgres_dsn: String::new(),
            required: false,
            db_workers: 4,
        }
    }
}

impl StoreConfig {
    /// core 설정에서 스토어 설정을 만듭니다.
    pub fn from_core(config: &HistonConfig) -> Self {
        Self {
            postgres_dsn: config.db.postgres_dsn.clone(),
            required: config.db.required,
            db_workers: config.ingest.db_workers,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.db_workers == 0 {
            return Err(StoreError::Config {
                field: "ingest.db_workers".to_owned(),
                reason: "must be > 0".to_owned(),
            });
        }
        if self.required && self.postgres_dsn.trim().is_empty() {
            return Err(StoreError::Config {
                field: "db.postgres_dsn".to_owned(),
                reason: "required when db.required = true".to_owned(),
            });
        }
        Ok(())
    }
}
