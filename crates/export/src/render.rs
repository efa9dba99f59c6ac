//! 정규 라인 재구성 (pretty printer)
//!
//! 저장된 행을 인제스트 라인의 정규 형태로 되돌립니다:
//!
//! ```text
//! TS - SID - HOST [cwd=CWD] > CMD
//! ```
//!
//! 타임스탬프는 `ts_client`를 우선하고 없으면 `ts_ingested`를
//! 사용합니다. 비어 있거나 `"unknown"`인 세션/호스트는 `-`로
//! 렌더링됩니다.

use chrono::{DateTime, Local, Utc};

/// 클라이언트/수집 타임스탬프 형식
const TS_LAYOUT: &str = "%Y%m%d.%H%M%S";

/// 행 하나를 정규 라인으로 렌더링합니다.
pub fn format_export_line(
    ts_client: Option<DateTime<Utc>>,
    ts_ingested: DateTime<Utc>,
    session_id: Option<&str>,
    host: Option<&str>,
    cwd: Option<&str>,
    cmd: Option<&str>,
    raw: &str,
) -> String {
    let ts = ts_client.unwrap_or(ts_ingested);
    let ts_str = ts.with_timezone(&Local).format(TS_LAYOUT).to_string();

    let session = present_or_dash(session_id);
    let host = present_or_dash(host);

    let mut payload = cmd.map(str::trim).unwrap_or("").to_owned();
    if payload.is_empty() {
        payload = raw.trim().to_owned();
    }
    if payload.is_empty() {
        payload = "-".to_owned();
    }
    let payload = sanitize_one_line(&payload);

    if let Some(cwd) = cwd.map(str::trim).filter(|s| !s.is_empty()) {
        return format!(
            "{ts_str} - {session} - {host} [cwd={}] > {payload}",
            sanitize_one_line(cwd)
        );
    }

    format!("{ts_str} - {session} - {host} > {payload}")
}

fn present_or_dash(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() && v != "unknown" => v,
        _ => "-",
    }
}

/// CR/LF를 리터럴 이스케이프로 치환하고 말미 공백을 제거합니다.
fn sanitize_one_line(s: &str) -> String {
    s.replace('\r', "\\r")
        .replace('\n', "\\n")
        .trim_end_matches([' ', '\t'])
        .to_owned()
}
