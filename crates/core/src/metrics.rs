//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `histon_`
//! - 모듈명: `ingest_`, `store_`, `export_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/duration)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(histon_core::metrics::INGEST_LINES_ACCEPTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 드롭 사유 레이블 키 (frame, auth, parse, spool_io, queue)
pub const LABEL_REASON: &str = "reason";

/// 트랜스포트 레이블 키 (raw, tls)
pub const LABEL_TRANSPORT: &str = "transport";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 검증을 통과해 수락된 라인 수 (counter)
pub const INGEST_LINES_ACCEPTED_TOTAL: &str = "histon_ingest_lines_accepted_total";

/// Ingest: 드롭된 라인 수 (counter, label: reason)
pub const INGEST_LINES_DROPPED_TOTAL: &str = "histon_ingest_lines_dropped_total";

/// Ingest: 스풀 파일에 기록된 라인 수 (counter)
pub const INGEST_LINES_SPOOLED_TOTAL: &str = "histon_ingest_lines_spooled_total";

/// Ingest: 수락된 연결 수 (counter, label: transport)
pub const INGEST_CONNECTIONS_TOTAL: &str = "histon_ingest_connections_total";

// ─── Store 메트릭 ──────────────────────────────────────────────────

/// Store: 성공한 DB insert 수 (counter)
pub const STORE_INSERT_OK_TOTAL: &str = "histon_store_insert_ok_total";

/// Store: 실패한 DB insert 수 (counter)
pub const STORE_INSERT_FAIL_TOTAL: &str = "histon_store_insert_fail_total";

// ─── Export 메트릭 ─────────────────────────────────────────────────

/// Export: 처리된 요청 수 (counter)
pub const EXPORT_REQUESTS_TOTAL: &str = "histon_export_requests_total";

/// Export: 스트리밍된 행 수 (counter)
pub const EXPORT_ROWS_STREAMED_TOTAL: &str = "histon_export_rows_streamed_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 기동 후 경과 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "histon_daemon_uptime_seconds";

/// Daemon: 등록된 모듈 수 (gauge)
pub const DAEMON_MODULES: &str = "histon_daemon_modules";

/// 모든 메트릭의 설명을 recorder에 등록합니다.
///
/// Prometheus recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        INGEST_LINES_ACCEPTED_TOTAL,
        "Lines that passed tenant resolution and strict parse"
    );
    describe_counter!(
        INGEST_LINES_DROPPED_TOTAL,
        "Lines dropped before spooling, labelled by reason"
    );
    describe_counter!(
        INGEST_LINES_SPOOLED_TOTAL,
        "Lines durably appended to a tenant spool file"
    );
    describe_counter!(
        INGEST_CONNECTIONS_TOTAL,
        "Accepted ingest connections, labelled by transport"
    );
    describe_counter!(STORE_INSERT_OK_TOTAL, "Successful cmd_events inserts");
    describe_counter!(STORE_INSERT_FAIL_TOTAL, "Failed cmd_events insert attempts");
    describe_counter!(EXPORT_REQUESTS_TOTAL, "Export HTTP requests handled");
    describe_counter!(EXPORT_ROWS_STREAMED_TOTAL, "Rows written to export responses");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_MODULES, "Number of registered service modules");
}
