//! API 키 자격 증명 — 해시 계산과 상수 시간 검증
//!
//! 토큰 형식은 `key_id.secret`이며 `key_id`는 `hc_` 접두어 뒤 8자리
//! 소문자 16진수입니다. DB에는 secret 자체가 아니라
//! `sha256(secret ":" pepper)`의 16진 표현만 저장됩니다.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// key_id 형식: `hc_` + 8자리 소문자 16진수
pub const KEY_ID_PREFIX: &str = "hc_";
/// secret 최소 길이
pub const SECRET_MIN_LEN: usize = 16;
/// secret 최대 길이
pub const SECRET_MAX_LEN: usize = 128;

/// `sha256(secret ":" pepper)`의 16진 표현을 계산합니다.
pub fn hash_secret(secret: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

/// secret을 저장된 해시와 상수 시간으로 비교합니다.
///
/// 첫 불일치 바이트에서 조기 탈출하지 않습니다.
pub fn verify_secret(secret: &str, pepper: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(secret, pepper);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// `key_id.secret` 토큰을 첫 `.` 기준으로 분리합니다.
///
/// 양쪽 모두 비어 있지 않아야 합니다.
pub fn split_token(token: &str) -> Option<(&str, &str)> {
    let idx = token.find('.')?;
    if idx == 0 || idx == token.len() - 1 {
        return None;
    }
    Some((&token[..idx], &token[idx + 1..]))
}

/// key_id가 `hc_xxxxxxxx` (소문자 16진) 형식인지 확인합니다.
pub fn key_id_is_valid(key_id: &str) -> bool {
    let Some(hex_part) = key_id.strip_prefix(KEY_ID_PREFIX) else {
        return false;
    };
    hex_part.len() == 8
        && hex_part
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// secret 길이가 허용 범위인지 확인합니다.
pub fn secret_len_is_valid(secret: &str) -> bool {
    (SECRET_MIN_LEN..=SECRET_MAX_LEN).contains(&secret.len())
}
