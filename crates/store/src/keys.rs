//! API 키 생성
//!
//! key_id는 `hc_` + 4바이트 난수의 16진 표현, secret은 24바이트
//! 난수의 URL-safe base64입니다. DB에는 secret 자체가 아니라
//! `sha256(secret ":" pepper)` 해시만 저장되므로 토큰은 생성 시점에
//! 한 번만 보여 줄 수 있습니다.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tracing::debug;
use uuid::Uuid;

use histon_core::credential;

use crate::db::Db;
use crate::error::{is_unique_violation, StoreError};

/// key_id 충돌 시 재시도 횟수
const KEY_ID_RETRIES: usize = 3;

/// 생성된 API 키
///
/// `token`(= `key_id.secret`)은 이 구조체 밖으로 나간 뒤에는 복원할 수
/// 없습니다.
#[derive(Debug, Clone)]
pub struct CreatedKey {
    /// 키가 속한 테넌트
    pub tenant_id: Uuid,
    /// 선택적 사용자
    pub user_id: Option<Uuid>,
    /// 공개 식별자 (`hc_xxxxxxxx`)
    pub key_id: String,
    /// 전체 bearer 토큰 (`key_id.secret`)
    pub token: String,
}

/// 테넌트용 API 키를 생성해 저장합니다.
///
/// 테넌트가 `tenants` 테이블에 없으면 실패합니다. `key_id` 충돌은
/// 새 id로 최대 3회 재시도합니다.
pub async fn create_api_key(
    db: &Db,
    tenant_id: Uuid,
    user_id: Option<Uuid>,
    pepper: &str,
) -> Result<CreatedKey, StoreError> {
    ensure_tenant_exists(db, tenant_id).await?;

    let secret = generate_secret();
    let key_hash = credential::hash_secret(&secret, pepper.trim());
    let id = Uuid::new_v4();

    let mut key_id = generate_key_id();
    let mut attempts = 0;
    loop {
        match insert_api_key(db, id, tenant_id, user_id, &key_id, &key_hash).await {
            Ok(()) => break,
            Err(e) if is_unique_violation(&e) => {
                attempts += 1;
                if attempts > KEY_ID_RETRIES {
                    return Err(StoreError::KeyIdCollision);
                }
                debug!(key_id, attempts, "key_id collision, regenerating");
                key_id = generate_key_id();
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(CreatedKey {
        tenant_id,
        user_id,
        key_id: key_id.clone(),
        token: format!("{key_id}.{secret}"),
    })
}

async fn ensure_tenant_exists(db: &Db, tenant_id: Uuid) -> Result<(), StoreError> {
    let row = sqlx::query("select id from tenants where id = $1")
        .bind(tenant_id)
        .fetch_optional(db.pool())
        .await?;
    if row.is_none() {
        return Err(StoreError::TenantNotFound {
            tenant_id: tenant_id.to_string(),
        });
    }
    Ok(())
}

async fn insert_api_key(
    db: &Db,
    id: Uuid,
    tenant_id: Uuid,
    user_id: Option<Uuid>,
    key_id: &str,
    key_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "insert into api_keys (id, tenant_id, user_id, key_id, key_hash) values ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(user_id)
    .bind(key_id)
    .bind(key_hash)
    .execute(db.pool())
    .await?;
    Ok(())
}

fn generate_key_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("hc_{}", hex::encode(bytes))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
