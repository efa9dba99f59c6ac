//! 익스포트 쿼리 파라미터 파싱과 SQL 구성
//!
//! 정렬과 행 수 제한은 SQL에서 적용됩니다. `grep1`이 정규식
//! 메타문자를 포함하지 않으면 대소문자 무시 부분 문자열 매칭으로
//! DB까지 내려보내고, 그렇지 않으면 `raw_line`에 대한 `~*` 정규식
//! 매칭을 사용합니다. `grep2`/`grep3`는 스트리밍 단계에서만
//! 평가됩니다.

use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::ExportError;
use crate::grep::{is_plain_substring, ColorMode};

/// 제한 미지정 시 기본 최대 행 수
pub const DEFAULT_MAX_ROWS: i64 = 200_000;

/// 정렬 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportOrder {
    /// 수집 시각 오름차순 (기본값)
    #[default]
    IngestAsc,
    /// 수집 시각 내림차순
    IngestDesc,
    /// 클라이언트 시각 오름차순
    ClientAsc,
    /// 클라이언트 시각 내림차순
    ClientDesc,
}

impl ExportOrder {
    /// 쿼리 파라미터 값을 파싱합니다. 빈 문자열은 기본값입니다.
    pub fn parse(value: &str) -> Result<Self, ExportError> {
        match value {
            "" | "ingest_asc" => Ok(Self::IngestAsc),
            "ingest_desc" => Ok(Self::IngestDesc),
            "client_asc" => Ok(Self::ClientAsc),
            "client_desc" => Ok(Self::ClientDesc),
            other => Err(ExportError::BadQuery(format!(
                "invalid order={other:?} (use ingest_desc|ingest_asc|client_desc|client_asc)"
            ))),
        }
    }

    /// ORDER BY 절 본문을 반환합니다.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::IngestDesc => "ts_ingested desc, id desc",
            Self::IngestAsc => "ts_ingested asc, id asc",
            Self::ClientDesc => "ts_client desc nulls last, id desc",
            Self::ClientAsc => "ts_client asc nulls last, id asc",
        }
    }
}

/// 파싱된 익스포트 쿼리
#[derive(Debug, Clone, Default)]
pub struct ExportQuery {
    /// 첫 번째 grep 패턴 (SQL 푸시다운 대상)
    pub grep1: String,
    /// 두 번째 grep 패턴
    pub grep2: String,
    /// 세 번째 grep 패턴
    pub grep3: String,
    /// 세션 ID 등호 필터
    pub session: String,
    /// 정렬 순서
    pub order: ExportOrder,
    /// 색상 모드
    pub color: ColorMode,
    /// 행 수 제한 (max_rows로 클램프됨)
    pub limit: i64,
}

/// 쿼리 파라미터를 파싱합니다.
///
/// `limit`은 양의 정수여야 하며 `max_rows`로 클램프됩니다.
pub fn parse_export_query(
    params: &HashMap<String, String>,
    max_rows: i64,
) -> Result<ExportQuery, ExportError> {
    let get = |key: &str| params.get(key).map(String::as_str).unwrap_or("");

    let order = ExportOrder::parse(get("order").trim())?;
    let color = ColorMode::parse(get("color").trim())?;

    let max_rows = if max_rows > 0 { max_rows } else { DEFAULT_MAX_ROWS };
    let mut limit = max_rows;
    let limit_param = get("limit").trim();
    if !limit_param.is_empty() {
        let requested: i64 = limit_param
            .parse()
            .map_err(|_| ExportError::BadQuery(format!("invalid limit={limit_param:?}")))?;
        if requested <= 0 {
            return Err(ExportError::BadQuery(format!(
                "invalid limit={limit_param:?}"
            )));
        }
        limit = requested.min(max_rows);
    }

    Ok(ExportQuery {
        grep1: get("grep1").to_owned(),
        grep2: get("grep2").to_owned(),
        grep3: get("grep3").to_owned(),
        session: get("session").trim().to_owned(),
        order,
        color,
        limit,
    })
}

/// 테넌트 필터와 선택적 세션/grep1 필터가 적용된 SELECT를 만듭니다.
pub fn build_export_sql<'a>(
    tenant_id: Uuid,
    query: &'a ExportQuery,
) -> QueryBuilder<'a, Postgres> {
    let mut builder: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("select raw_line from cmd_events where tenant_id = ");
    builder.push_bind(tenant_id);

    if !query.session.is_empty() {
        builder.push(" and session_id = ");
        builder.push_bind(&query.session);
    }

    let grep1 = query.grep1.trim();
    if !grep1.is_empty() {
        if is_plain_substring(grep1) {
            let needle = format!("%{grep1}%");
            builder.push(" and (raw_line ilike ");
            builder.push_bind(needle.clone());
            builder.push(" or cmd ilike ");
            builder.push_bind(needle);
            builder.push(")");
        } else {
            builder.push(" and raw_line ~* ");
            builder.push_bind(grep1);
        }
    }

    builder.push(" order by ");
    builder.push(query.order.as_sql());
    builder.push(" limit ");
    builder.push_bind(query.limit);

    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";

    #[test]
    fn defaults_when_no_params() {
        let q = parse_export_query(&params(&[]), 200_000).unwrap();
        assert_eq!(q.order, ExportOrder::IngestAsc);
        assert_eq!(q.color, ColorMode::Never);
        assert_eq!(q.limit, 200_000);
        assert!(q.grep1.is_empty());
        assert!(q.session.is_empty());
    }

    #[test]
    fn limit_is_clamped_to_max_rows() {
        let q = parse_export_query(&params(&[("limit", "999999")]), 1000).unwrap();
        assert_eq!(q.limit, 1000);

        let q = parse_export_query(&params(&[("limit", "10")]), 1000).unwrap();
        assert_eq!(q.limit, 10);
    }

    #[test]
    fn non_positive_limit_is_rejected() {
        assert!(parse_export_query(&params(&[("limit", "0")]), 1000).is_err());
        assert!(parse_export_query(&params(&[("limit", "-5")]), 1000).is_err());
        assert!(parse_export_query(&params(&[("limit", "ten")]), 1000).is_err());
    }

    #[test]
    fn order_values_parse() {
        for (value, expected) in [
            ("ingest_asc", ExportOrder::IngestAsc),
            ("ingest_desc", ExportOrder::IngestDesc),
            ("client_asc", ExportOrder::ClientAsc),
            ("client_desc", ExportOrder::ClientDesc),
        ] {
            let q = parse_export_query(&params(&[("order", value)]), 100).unwrap();
            assert_eq!(q.order, expected);
        }
        assert!(parse_export_query(&params(&[("order", "seq")]), 100).is_err());
    }

    #[test]
    fn bad_color_is_rejected() {
        assert!(parse_export_query(&params(&[("color", "rainbow")]), 100).is_err());
    }

    #[test]
    fn order_sql_mapping() {
        assert_eq!(ExportOrder::IngestAsc.as_sql(), "ts_ingested asc, id asc");
        assert_eq!(
            ExportOrder::ClientDesc.as_sql(),
            "ts_client desc nulls last, id desc"
        );
    }

    fn sql_text(query: &ExportQuery) -> String {
        let mut builder = build_export_sql(TENANT.parse().unwrap(), query);
        builder.sql().to_owned()
    }

    #[test]
    fn sql_with_plain_substring_uses_ilike() {
        let query = ExportQuery {
            grep1: "ssh".to_owned(),
            limit: 100,
            ..Default::default()
        };
        let sql = sql_text(&query);
        assert!(sql.contains("raw_line ilike"));
        assert!(sql.contains("cmd ilike"));
        assert!(!sql.contains("~*"));
    }

    #[test]
    fn sql_with_regex_uses_case_insensitive_match() {
        let query = ExportQuery {
            grep1: "ssh.*root".to_owned(),
            limit: 100,
            ..Default::default()
        };
        let sql = sql_text(&query);
        assert!(sql.contains("raw_line ~*"));
        assert!(!sql.contains("ilike"));
    }

    #[test]
    fn sql_includes_session_filter_only_when_set() {
        let query = ExportQuery {
            limit: 100,
            ..Default::default()
        };
        assert!(!sql_text(&query).contains("session_id"));

        let query = ExportQuery {
            session: "a1b2c3d4".to_owned(),
            limit: 100,
            ..Default::default()
        };
        assert!(sql_text(&query).contains("session_id ="));
    }

    #[test]
    fn sql_orders_and_limits() {
        let query = ExportQuery {
            order: ExportOrder::IngestDesc,
            limit: 42,
            ..Default::default()
        };
        let sql = sql_text(&query);
        assert!(sql.contains("order by ts_ingested desc, id desc"));
        assert!(sql.contains("limit"));
    }
}
