//! Payload에서 API 키 토큰을 추출하고 라인을 재작성합니다.
//!
//! 엄격 라인에서 payload 구간을 분리한 뒤, payload 선두의
//! `]apikey[TOKEN]` 또는 `]TOKEN[` 프레이밍에서 토큰을 떼어 냅니다.
//! 토큰과 구분자는 영구 저장되기 전에 라인에서 제거됩니다.

use std::sync::LazyLock;

use regex::Regex;

// 엄격 인제스트 형식. 파서 사다리의 엄격 패턴과 달리 세션 ID가 선택적이고
// 소문자 16진수만 허용한다.
static RE_STRICT_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<ts>\d{8}\.\d{6})\s*-\s*(?:(?P<sid>[0-9a-f]{8})\s*-\s*)?(?P<host>[A-Za-z0-9._-]+)(?:\s+\[cwd=(?P<cwd>[^\]]+)\])?\s+>\s+(?P<payload>.*)$",
    )
    .expect("strict payload pattern")
});

/// 엄격 라인에서 payload와 나머지(= payload를 제외한 라인)를 분리합니다.
///
/// 매칭은 트리밍된 라인에 대해 수행하고, payload 위치는 원본 라인에서
/// 부분 문자열 검색으로 찾습니다. 엄격 형식이 아니면 `None`입니다.
pub fn separate_payload_strict(line: &str) -> Option<(String, String)> {
    let captures = RE_STRICT_PAYLOAD.captures(line.trim())?;
    let payload = captures.name("payload")?.as_str();
    if payload.is_empty() {
        // 빈 payload에는 토큰이 있을 수 없음
        return None;
    }
    let pos = line.find(payload)?;
    let mut rest = String::with_capacity(line.len() - payload.len());
    rest.push_str(&line[..pos]);
    rest.push_str(&line[pos + payload.len()..]);
    Some((payload.to_owned(), rest))
}

/// Payload 선두에서 토큰을 추출합니다.
///
/// 지원 프레이밍:
/// - `]apikey[TOKEN] 나머지...` — 다음 `]`까지가 토큰
/// - `]TOKEN[ 나머지...` — 다음 `[`까지가 토큰
///
/// 성공 시 `(token, 토큰이 제거된 payload)`를 반환합니다.
pub fn extract_token_from_payload(payload: &str) -> Option<(String, String)> {
    let p = payload.trim();
    if p.is_empty() {
        return None;
    }

    if let Some(rest) = p.strip_prefix("]apikey[") {
        let end = rest.find(']')?;
        if end == 0 {
            return None;
        }
        let token = rest[..end].trim();
        if token.is_empty() {
            return None;
        }
        let after = rest[end + 1..].trim_start_matches([' ', '\t']);
        return Some((token.to_owned(), after.to_owned()));
    }

    if let Some(rest) = p.strip_prefix(']') {
        let end = rest.find('[')?;
        if end == 0 {
            return None;
        }
        let token = rest[..end].trim();
        if token.is_empty() {
            return None;
        }
        let after = rest[end + 1..].trim_start_matches([' ', '\t']);
        return Some((token.to_owned(), after.to_owned()));
    }

    None
}
