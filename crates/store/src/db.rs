//! PostgreSQL 액세스 계층
//!
//! 풀 크기와 타임아웃은 고정 정책입니다: 최대 10 연결, 유휴 최소 5,
//! 커넥션 수명 30분, 연결 5초. API 키 조회는 2초 타임아웃을 적용합니다.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use histon_core::event::CmdEvent;
use histon_core::pipeline::BoxFuture;
use histon_core::storage::{ApiKeyRecord, ApiKeyStore, SequenceStore};
use histon_core::StorageError;

use crate::error::StoreError;

/// API 키 조회 타임아웃
const KEY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// 스키마 부트스트랩 구문. 순서대로 실행됩니다.
const SCHEMA_STATEMENTS: &[&str] = &[
    "create extension if not exists pg_trgm;",
    r#"create table if not exists tenants (
        id uuid primary key,
        name text not null unique,
        created_at timestamptz not null default now()
    );"#,
    r#"create table if not exists cmd_events (
        id bigserial primary key,
        tenant_id uuid not null references tenants(id),
        seq bigint not null,

        ts_client timestamptz,
        session_id text not null,
        host_fqdn text not null,
        cwd text,
        cmd text,

        ts_ingested timestamptz not null default now(),
        src_ip inet,
        transport text not null default 'import',
        parse_ok boolean not null default true,

        raw_line text not null,
        unique (tenant_id, seq)
    );"#,
    r#"create table if not exists api_keys (
        id uuid primary key,
        tenant_id uuid not null references tenants(id),
        user_id uuid,
        key_id text not null unique,
        key_hash text not null,
        revoked_at timestamptz
    );"#,
    r#"create index if not exists cmd_events_tenant_id_id_desc
        on cmd_events (tenant_id, id desc);"#,
    r#"create index if not exists cmd_events_raw_trgm
        on cmd_events using gin (raw_line gin_trgm_ops);"#,
    r#"create index if not exists cmd_events_cmd_trgm
        on cmd_events using gin (cmd gin_trgm_ops);"#,
];

/// 커넥션 풀 래퍼
#[derive(Clone, Debug)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// DSN으로 풀을 만들고 연결을 확인합니다.
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        if dsn.trim().is_empty() {
            return Err(StoreError::Config {
                field: "db.postgres_dsn".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(5)
            .max_lifetime(Duration::from_secs(30 * 60))
            .acquire_timeout(Duration::from_secs(5))
            .connect(dsn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// 내부 풀 참조를 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 테이블/인덱스가 없으면 생성합니다.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                StoreError::Query(format!("ensure schema failed on {}: {e}", short_sql(statement)))
            })?;
        }
        Ok(())
    }

    /// 테넌트 행이 없으면 추가합니다.
    pub async fn ensure_tenant(&self, tenant_id: &str, name: &str) -> Result<(), StoreError> {
        let id = parse_tenant_uuid(tenant_id)?;
        sqlx::query("insert into tenants (id, name) values ($1, $2) on conflict (id) do nothing")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 테넌트의 `max(seq)`를 조회합니다. 행이 없으면 0입니다.
    pub async fn max_seq(&self, tenant_id: &str) -> Result<i64, StoreError> {
        let id = parse_tenant_uuid(tenant_id)?;
        let row: PgRow =
            sqlx::query("select coalesce(max(seq), 0) as max_seq from cmd_events where tenant_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.try_get::<i64, _>("max_seq")?)
    }

    /// 시퀀스가 부여된 이벤트를 저장합니다.
    ///
    /// `(tenant_id, seq)` 충돌은 no-op입니다 (재삽입 idempotent).
    /// 비어 있는 선택 필드는 SQL NULL로 전송됩니다.
    pub async fn insert_event_with_seq(&self, ev: &CmdEvent, seq: i64) -> Result<(), StoreError> {
        let tenant = parse_tenant_uuid(&ev.tenant_id)?;

        sqlx::query(
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
        .bind(null_when_empty(ev.cwd.as_deref()))
        .bind(null_when_empty(ev.cmd.as_deref()))
        .bind(&ev.raw_line)
        .bind(null_when_empty(ev.src_ip.as_deref()))
        .bind(&ev.transport)
        .bind(ev.parse_ok)
        .execute(&self.pool)
        .await?;

        debug!(tenant = %ev.tenant_id, seq, "event insert attempted");
        Ok(())
    }

    /// key_id로 API 키 레코드를 조회합니다. 2초 타임아웃.
    pub async fn lookup_api_key(&self, key_id: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let query = sqlx::query(
            "select tenant_id::text as tenant_id, key_hash, revoked_at from api_keys where key_id = $1",
        )
        .bind(key_id)
        .fetch_optional(&self.pool);

        let row = tokio::time::timeout(KEY_LOOKUP_TIMEOUT, query)
            .await
            .map_err(|_| StoreError::Query("api key lookup timed out".to_owned()))??;

        let Some(row) = row else {
            return Ok(None);
        };

        let revoked_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("revoked_at")?;
        Ok(Some(ApiKeyRecord {
            tenant_id: row.try_get::<String, _>("tenant_id")?.trim().to_owned(),
            key_hash: row.try_get("key_hash")?,
            revoked: revoked_at.is_some(),
        }))
    }
}

impl SequenceStore for Db {
    fn max_seq<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, Result<i64, StorageError>> {
        Box::pin(async move { Db::max_seq(self, tenant_id).await.map_err(StorageError::from) })
    }
}

impl ApiKeyStore for Db {
    fn lookup_key<'a>(
        &'a self,
        key_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ApiKeyRecord>, StorageError>> {
        Box::pin(async move {
            Db::lookup_api_key(self, key_id)
                .await
                .map_err(StorageError::from)
        })
    }
}

/// 비어 있는 문자열을 NULL로 보냅니다.
fn null_when_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

pub(crate) fn parse_tenant_uuid(tenant_id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(tenant_id.trim()).map_err(|e| StoreError::Query(format!(
        "tenant id '{tenant_id}' is not a uuid: {e}"
    )))
}

fn short_sql(statement: &str) -> String {
    let compact = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() > 80 {
        format!("{}...", &compact[..80])
    } else {
        compact
    }
}
