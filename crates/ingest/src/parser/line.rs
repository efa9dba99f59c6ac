//! 라인 파싱 — 패턴 사다리와 필드 추출
//!
//! 라인 형식 (엄격):
//!
//! ```text
//! TS - SID - HOST [cwd=CWD]  > PAYLOAD
//! TS   = 8자리 날짜 "." 6자리 시각 (예: 20240115.103005)
//! SID  = 8자리 16진 세션 ID
//! HOST = [A-Za-z0-9._-]+
//! ```
//!
//! 모든 패턴은 앵커링되어 있고 한 번만 컴파일됩니다.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;

use histon_core::event::CmdEvent;

/// 매칭된 패턴 종류
///
/// 사다리 순서대로 나열되어 있습니다. [`Complete`](Self::Complete)만
/// 엄격 형식이며, 나머지는 레거시 임포트용 best-effort 형식입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseKind {
    /// `TS - SID - HOST [cwd=..]? > PAYLOAD` (엄격)
    Complete,
    /// `TS - SID - HOST` 뒤 공백 2개 이상 후 payload
    Session,
    /// 공백 1개 이상 변형
    SessionLoose,
    /// `TS - HOST` 공백 2개 이상 후 payload (세션 없음)
    NoSession,
    /// 공백 1개 이상 변형
    NoSessionLoose,
    /// `TS PAYLOAD` (타임스탬프만)
    TimestampOnly,
    /// 어느 패턴에도 매칭되지 않음
    NoMatch,
}

impl fmt::Display for ParseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Session => "session",
            Self::SessionLoose => "session-loose",
            Self::NoSession => "no-session",
            Self::NoSessionLoose => "no-session-loose",
            Self::TimestampOnly => "ts-only",
            Self::NoMatch => "no-match",
        };
        f.write_str(s)
    }
}

static RE_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<ts>\d{8}\.\d{6})\s*-\s*(?P<sid>[0-9a-fA-F]{8})\s*-\s*(?P<host>[A-Za-z0-9._-]+)(?:\s+\[cwd=(?P<cwd>[^\]]+)\])?\s+>\s+(?P<payload>.*)$",
    )
    .expect("complete pattern")
});

static RE_SESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8}\.\d{6})\s*-\s*([0-9a-fA-F]{8})\s*-\s*(.+?)\s{2,}(.*)$")
        .expect("session pattern")
});

static RE_SESSION_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8}\.\d{6})\s*-\s*([0-9a-fA-F]{8})\s*-\s*(.+?)\s+(.*)$")
        .expect("session-loose pattern")
});

static RE_NO_SESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8}\.\d{6})\s*-\s*(.+?)\s{2,}(.*)$").expect("no-session pattern")
});

static RE_NO_SESSION_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8}\.\d{6})\s*-\s*(.+?)\s+(.*)$").expect("no-session-loose pattern")
});

static RE_TS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8}\.\d{6})\s+(.*)$").expect("ts-only pattern"));

/// `YYYYMMDD.HHMMSS` 타임스탬프를 프로세스 로컬 타임존으로 파싱합니다.
pub fn parse_client_ts(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y%m%d.%H%M%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

struct Extracted<'a> {
    ts: &'a str,
    sid: &'a str,
    host: &'a str,
    cwd: &'a str,
    payload: &'a str,
}

fn try_patterns(s: &str) -> Option<(ParseKind, Extracted<'_>)> {
    if let Some(m) = RE_COMPLETE.captures(s) {
        return Some((
            ParseKind::Complete,
            Extracted {
                ts: m.name("ts").map_or("", |g| g.as_str()),
                sid: m.name("sid").map_or("", |g| g.as_str()),
                host: m.name("host").map_or("", |g| g.as_str()),
                cwd: m.name("cwd").map_or("", |g| g.as_str()),
                payload: m.name("payload").map_or("", |g| g.as_str()),
            },
        ));
    }
    for (kind, re) in [
        (ParseKind::Session, &*RE_SESSION),
        (ParseKind::SessionLoose, &*RE_SESSION_LOOSE),
    ] {
        if let Some(m) = re.captures(s) {
            return Some((
                kind,
                Extracted {
                    ts: m.get(1).map_or("", |g| g.as_str()),
                    sid: m.get(2).map_or("", |g| g.as_str()),
                    host: m.get(3).map_or("", |g| g.as_str()),
                    cwd: "",
                    payload: m.get(4).map_or("", |g| g.as_str()),
                },
            ));
        }
    }
    for (kind, re) in [
        (ParseKind::NoSession, &*RE_NO_SESSION),
        (ParseKind::NoSessionLoose, &*RE_NO_SESSION_LOOSE),
    ] {
        if let Some(m) = re.captures(s) {
            return Some((
                kind,
                Extracted {
                    ts: m.get(1).map_or("", |g| g.as_str()),
                    sid: "",
                    host: m.get(2).map_or("", |g| g.as_str()),
                    cwd: "",
                    payload: m.get(3).map_or("", |g| g.as_str()),
                },
            ));
        }
    }
    if let Some(m) = RE_TS_ONLY.captures(s) {
        return Some((
            ParseKind::TimestampOnly,
            Extracted {
                ts: m.get(1).map_or("", |g| g.as_str()),
                sid: "",
                host: "",
                cwd: "",
                payload: m.get(2).map_or("", |g| g.as_str()),
            },
        ));
    }
    None
}

/// 한 줄을 파싱해 이벤트와 매칭 종류를 반환합니다.
///
/// 어떤 입력에도 실패하지 않습니다. 매칭되지 않거나 필드가 비면
/// 세션/호스트는 리터럴 `"unknown"`으로 채워지고 `parse_ok`가 false가
/// 됩니다. `parse_ok`는 종류별 필수 필드(타임스탬프, 호스트, 세션,
/// 비어 있지 않은 커맨드)가 모두 있을 때만 true입니다.
/// [`ParseKind::TimestampOnly`]는 항상 `parse_ok = false`입니다.
pub fn parse_line(tenant_id: &str, line: &str) -> (CmdEvent, ParseKind) {
    let mut ev = CmdEvent::bare(tenant_id, line);

    let s = line.trim_end_matches(['\r', '\n']).trim();
    if s.is_empty() {
        ev.session_id = "unknown".to_owned();
        ev.host_fqdn = "unknown".to_owned();
        return (ev, ParseKind::NoMatch);
    }

    let Some((kind, fields)) = try_patterns(s) else {
        ev.session_id = "unknown".to_owned();
        ev.host_fqdn = "unknown".to_owned();
        return (ev, ParseKind::NoMatch);
    };

    if !fields.ts.is_empty() {
        ev.ts_client = parse_client_ts(fields.ts);
    }

    let host = fields.host.trim();
    if host.is_empty() || host.contains([' ', '\t', '\r', '\n']) {
        ev.host_fqdn = "unknown".to_owned();
    } else {
        ev.host_fqdn = host.to_owned();
    }

    let sid = fields.sid.trim();
    if sid.is_empty() {
        ev.session_id = "unknown".to_owned();
    } else {
        ev.session_id = sid.to_ascii_lowercase();
    }

    let cwd = fields.cwd.trim();
    if !cwd.is_empty() {
        ev.cwd = Some(cwd.to_owned());
    }

    let mut cmd_text = fields.payload.trim();
    if let Some(stripped) = cmd_text.strip_prefix('>') {
        cmd_text = stripped.trim();
    }
    if !cmd_text.is_empty() {
        ev.cmd = Some(cmd_text.to_owned());
    }

    let has_cmd = ev.cmd.as_deref().is_some_and(|c| !c.trim().is_empty());
    ev.parse_ok = match kind {
        ParseKind::Complete | ParseKind::Session | ParseKind::SessionLoose => {
            ev.ts_client.is_some()
                && ev.host_fqdn != "unknown"
                && ev.session_id != "unknown"
                && has_cmd
        }
        ParseKind::NoSession | ParseKind::NoSessionLoose => {
            ev.ts_client.is_some() && ev.host_fqdn != "unknown" && has_cmd
        }
        ParseKind::TimestampOnly | ParseKind::NoMatch => false,
    };

    (ev, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";

    #[test]
    fn complete_line_with_cwd() {
        let (ev, kind) = parse_line(
            TENANT,
            "20240115.103005 - a1b2c3d4 - host.example [cwd=/tmp] > ls -la",
        );
        assert_eq!(kind, ParseKind::Complete);
        assert!(ev.parse_ok);
        assert_eq!(ev.session_id, "a1b2c3d4");
        assert_eq!(ev.host_fqdn, "host.example");
        assert_eq!(ev.cwd.as_deref(), Some("/tmp"));
        assert_eq!(ev.cmd.as_deref(), Some("ls -la"));
        let ts = ev.ts_client.unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 15));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (10, 30, 5));
    }

    #[test]
    fn complete_line_without_cwd() {
        let (ev, kind) = parse_line(TENANT, "20240115.103005 - a1b2c3d4 - host > make test");
        assert_eq!(kind, ParseKind::Complete);
        assert!(ev.parse_ok);
        assert!(ev.cwd.is_none());
        assert_eq!(ev.cmd.as_deref(), Some("make test"));
    }

    #[test]
    fn session_id_is_lowercased() {
        let (ev, kind) = parse_line(TENANT, "20240115.103005 - A1B2C3D4 - host > x");
        assert_eq!(kind, ParseKind::Complete);
        assert_eq!(ev.session_id, "a1b2c3d4");
    }

    #[test]
    fn legacy_two_space_form_without_arrow() {
        let (ev, kind) = parse_line(TENANT, "20240115.103005 - a1b2c3d4 - host  git status");
        assert_eq!(kind, ParseKind::Session);
        assert!(ev.parse_ok);
        assert_eq!(ev.cmd.as_deref(), Some("git status"));
    }

    #[test]
    fn no_session_form() {
        let (ev, kind) = parse_line(TENANT, "20240115.103005 - host.example  uptime");
        assert_eq!(kind, ParseKind::NoSession);
        assert!(ev.parse_ok);
        assert_eq!(ev.session_id, "unknown");
        assert_eq!(ev.host_fqdn, "host.example");
    }

    #[test]
    fn ts_only_is_never_parse_ok() {
        let (ev, kind) = parse_line(TENANT, "20240115.103005 some free text");
        assert_eq!(kind, ParseKind::TimestampOnly);
        assert!(!ev.parse_ok);
        assert_eq!(ev.cmd.as_deref(), Some("some free text"));
    }

    #[test]
    fn garbage_is_no_match() {
        let (ev, kind) = parse_line(TENANT, "hello world");
        assert_eq!(kind, ParseKind::NoMatch);
        assert!(!ev.parse_ok);
        assert_eq!(ev.session_id, "unknown");
        assert_eq!(ev.host_fqdn, "unknown");
        assert_eq!(ev.raw_line, "hello world");
    }

    #[test]
    fn empty_line_is_no_match() {
        let (ev, kind) = parse_line(TENANT, "   \r\n");
        assert_eq!(kind, ParseKind::NoMatch);
        assert!(!ev.parse_ok);
        assert_eq!(ev.host_fqdn, "unknown");
    }

    #[test]
    fn empty_payload_fails_parse_ok() {
        // 트리밍 후 "> "가 ">"로 줄어들어 엄격 패턴이 매칭되지 않고,
        // 관용 패턴으로 떨어져도 커맨드가 비어 parse_ok가 아님
        let (ev, kind) = parse_line(TENANT, "20240115.103005 - a1b2c3d4 - host > ");
        assert_eq!(kind, ParseKind::SessionLoose);
        assert!(!ev.parse_ok);
        assert!(ev.cmd.is_none());
    }

    #[test]
    fn bad_timestamp_value_fails_parse_ok() {
        // 13월은 형식은 맞지만 달력상 불가능
        let (ev, kind) = parse_line(TENANT, "20241315.103005 - a1b2c3d4 - host > ls");
        assert_eq!(kind, ParseKind::Complete);
        assert!(ev.ts_client.is_none());
        assert!(!ev.parse_ok);
    }

    #[test]
    fn seven_hex_session_falls_through() {
        // 세션 ID가 8자리가 아니면 엄격 패턴이 매칭되지 않음
        let (_, kind) = parse_line(TENANT, "20240115.103005 - a1b2c3 - host > ls");
        assert_ne!(kind, ParseKind::Complete);
    }

    #[test]
    fn payload_keeps_inner_spacing() {
        let (ev, _) = parse_line(
            TENANT,
            "20240115.103005 - a1b2c3d4 - host > echo 'a  b   c'",
        );
        assert_eq!(ev.cmd.as_deref(), Some("echo 'a  b   c'"));
    }

    #[test]
    fn raw_line_is_preserved() {
        let raw = "20240115.103005 - a1b2c3d4 - host > ls";
        let (ev, _) = parse_line(TENANT, raw);
        assert_eq!(ev.raw_line, raw);
        assert_eq!(ev.tenant_id, TENANT);
    }

    #[test]
    fn client_ts_rejects_malformed() {
        assert!(parse_client_ts("20240115").is_none());
        assert!(parse_client_ts("2024011a.103005").is_none());
        assert!(parse_client_ts("20240115.103005").is_some());
    }
}
