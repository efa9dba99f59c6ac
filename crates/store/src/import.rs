//! 레거시 히스토리 일괄 임포트
//!
//! 파일의 각 줄을 관용 파서로 best-effort 파싱해 한 트랜잭션으로
//! 저장합니다. 시퀀스는 테넌트의 현재 `max(seq)` 위에서 이어지고,
//! 트랜스포트는 `"import"`, 송신 IP는 NULL입니다.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use histon_ingest::parse_line;

use crate::db::{parse_tenant_uuid, Db};
use crate::error::StoreError;

/// 한 줄의 최대 길이 (바이트). 넘치면 임포트가 실패합니다.
const MAX_IMPORT_LINE_BYTES: usize = 2 * 1024 * 1024;

/// 임포트 결과 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// 새로 들어간 행 수
    pub inserted: u64,
    /// `(tenant_id, seq)` 충돌로 건너뛴 행 수
    pub skipped: u64,
}

/// 히스토리 파일을 테넌트로 임포트합니다.
///
/// 전체가 한 트랜잭션입니다. 어느 줄이든 insert가 실패하면 전부
/// 롤백됩니다. 빈 줄은 건너뜁니다.
pub async fn import_history_file(
    db: &Db,
    tenant_id: &str,
    path: &Path,
) -> Result<ImportOutcome, StoreError> {
    let tenant = parse_tenant_uuid(tenant_id)?;

    let file = File::open(path).await?;
    let mut lines = BufReader::with_capacity(64 * 1024, file).split(b'\n');

    let mut seq = db.max_seq(tenant_id).await?;
    let mut outcome = ImportOutcome::default();

    let mut tx = db.pool().begin().await?;

    while let Some(raw) = lines.next_segment().await? {
        if raw.len() > MAX_IMPORT_LINE_BYTES {
            return Err(StoreError::Query(format!(
                "import line exceeds {MAX_IMPORT_LINE_BYTES} bytes"
            )));
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        seq += 1;
        let (mut ev, _) = parse_line(tenant_id, line);
        ev.transport = "import".to_owned();

        let result = sqlx::query(
            r#"insert into cmd_events
                (tenant_id, seq, ts_client, session_id, host_fqdn, cwd, cmd, raw_line, src_ip, transport, parse_ok)
            values
                ($1, $2, $3, $4, $5, $6, $7, $8, $9::inet, $10, $11)
            on conflict (tenant_id, seq) do nothing"#,
        )
        .bind(tenant)
        .bind(seq)
        .bind(ev.ts_client)
        .bind(&ev.session_id)
        .bind(&ev.host_fqdn)
        .bind(ev.cwd.as_deref().filter(|s| !s.is_empty()))
        .bind(ev.cmd.as_deref().filter(|s| !s.is_empty()))
        .bind(&ev.raw_line)
        .bind(Option::<&str>::None)
        .bind(&ev.transport)
        .bind(ev.parse_ok)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            outcome.inserted += 1;
        } else {
            outcome.skipped += 1;
        }
    }

    tx.commit().await?;

    info!(
        tenant = tenant_id,
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "history import finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_defaults_to_zero() {
        let outcome = ImportOutcome::default();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn bad_tenant_uuid_fails_before_io() {
        // Db 없이도 UUID 검증은 동작해야 하지만 Db가 필수 인자이므로
        // 여기서는 UUID 헬퍼만 확인한다
        assert!(parse_tenant_uuid("not-a-uuid").is_err());
    }
}
