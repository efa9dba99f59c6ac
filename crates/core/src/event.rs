//! 메시지 타입 — 인제스트 파이프라인 단계 간 통신의 기본 단위
//!
//! 모든 단계 간 통신은 bounded mpsc 채널을 통한 메시지 패싱으로 수행됩니다.
//! 메시지는 파이프라인을 왼쪽에서 오른쪽으로만 흐릅니다:
//!
//! ```text
//! listener -> RawMessage -> validator -> ValidatedMessage -> spooler
//!          -> SequencedMessage -> db writer
//! ```

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// 인제스트 파이프라인 모듈명
pub const MODULE_INGEST: &str = "ingest-pipeline";
/// DB 작성기 모듈명
pub const MODULE_STORE: &str = "store-writer";
/// 익스포트 서비스 모듈명
pub const MODULE_EXPORT: &str = "export-http";

/// 인제스트 트랜스포트 종류
///
/// 메시지가 수신된 리스너 유형을 나타냅니다. DB의 `transport` 컬럼에
/// 문자열 형태로 기록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// 평문 TCP 리스너
    Raw,
    /// TLS 리스너
    Tls,
    /// 레거시 히스토리 일괄 임포트
    Import,
}

impl Transport {
    /// DB에 기록되는 문자열 표현을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Tls => "tls",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 검증 전 원시 메시지 — 리스너가 생성합니다.
///
/// 한 연결에서 정확히 한 프레임만 수신되며, 프레임 규율 검사를 통과한
/// 라인만 이 형태로 파이프라인에 진입합니다.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// 수신된 한 줄 (LF 제거, 트리밍 완료)
    pub line: String,
    /// 송신 피어 IP
    pub peer_ip: IpAddr,
    /// 수신 시각 (정렬 키가 아닌 기록용)
    pub received_at: SystemTime,
    /// 수신 트랜스포트
    pub transport: Transport,
}

impl RawMessage {
    /// 새 원시 메시지를 생성합니다.
    pub fn new(line: impl Into<String>, peer_ip: IpAddr, transport: Transport) -> Self {
        Self {
            line: line.into(),
            peer_ip,
            received_at: SystemTime::now(),
            transport,
        }
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawMessage[{}] peer={} len={}",
            self.transport,
            self.peer_ip,
            self.line.len(),
        )
    }
}

/// 테넌트 해석과 엄격 파싱을 통과한 메시지 — 검증 워커가 생성합니다.
#[derive(Debug, Clone)]
pub struct ValidatedMessage {
    /// 검증된 라인 (apikey 인증 시 토큰이 제거된 형태)
    pub line: String,
    /// 해석된 테넌트 ID (UUID 문자열)
    pub tenant_id: String,
    /// 송신 피어 IP
    pub peer_ip: IpAddr,
    /// 수신 시각
    pub received_at: SystemTime,
    /// 수신 트랜스포트
    pub transport: Transport,
}

/// 시퀀스 번호가 부여된 메시지 — 스풀러가 생성합니다.
///
/// 스풀 파일에 먼저 기록된 뒤에만 이 형태로 DB 작성기에 전달됩니다
/// (durable-before-queue).
#[derive(Debug, Clone)]
pub struct SequencedMessage {
    /// 검증된 라인
    pub line: String,
    /// 테넌트 ID
    pub tenant_id: String,
    /// 테넌트별 단조 증가 시퀀스
    pub seq: i64,
    /// 송신 피어 IP
    pub peer_ip: IpAddr,
    /// 수신 시각
    pub received_at: SystemTime,
    /// 수신 트랜스포트
    pub transport: Transport,
}

impl SequencedMessage {
    /// 검증된 메시지에 시퀀스를 부여합니다.
    pub fn from_validated(msg: ValidatedMessage, seq: i64) -> Self {
        Self {
            line: msg.line,
            tenant_id: msg.tenant_id,
            seq,
            peer_ip: msg.peer_ip,
            received_at: msg.received_at,
            transport: msg.transport,
        }
    }
}

impl fmt::Display for SequencedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SequencedMessage[tenant={} seq={}] transport={}",
            self.tenant_id, self.seq, self.transport,
        )
    }
}

/// 파싱된 커맨드 이벤트 — `cmd_events` 테이블의 한 행에 대응합니다.
///
/// 세션/호스트가 비어 있으면 리터럴 `"unknown"`으로 채워지고,
/// 선택 필드는 비어 있을 때 SQL NULL로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdEvent {
    /// 소속 테넌트 (UUID 문자열)
    pub tenant_id: String,
    /// 클라이언트가 찍은 타임스탬프 (`YYYYMMDD.HHMMSS`, 로컬 타임존)
    pub ts_client: Option<DateTime<Local>>,
    /// 8자리 16진 세션 ID (소문자 정규화, 없으면 `"unknown"`)
    pub session_id: String,
    /// 송신 호스트 FQDN (없으면 `"unknown"`)
    pub host_fqdn: String,
    /// 커맨드 실행 디렉토리
    pub cwd: Option<String>,
    /// 커맨드 텍스트
    pub cmd: Option<String>,
    /// 원본 라인 (UTF-8 새니타이즈 완료)
    pub raw_line: String,
    /// 수신 트랜스포트 문자열 (`raw` / `tls` / `import`)
    pub transport: String,
    /// 송신 피어 IP 텍스트 표현
    pub src_ip: Option<String>,
    /// 엄격 파싱 성공 여부
    pub parse_ok: bool,
}

impl CmdEvent {
    /// 테넌트와 원본 라인만 채워진 빈 이벤트를 생성합니다.
    ///
    /// 파서가 필드를 채워 나가는 시작점입니다.
    pub fn bare(tenant_id: impl Into<String>, raw_line: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ts_client: None,
            session_id: String::new(),
            host_fqdn: String::new(),
            cwd: None,
            cmd: None,
            raw_line: raw_line.into(),
            transport: String::new(),
            src_ip: None,
            parse_ok: false,
        }
    }
}

impl fmt::Display for CmdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CmdEvent[tenant={} session={} host={} parse_ok={}]",
            self.tenant_id, self.session_id, self.host_fqdn, self.parse_ok,
        )
    }
}
