//! 인제스트 라인 파서 -- 한 줄을 [`CmdEvent`](histon_core::CmdEvent)로 파싱합니다.
//!
//! 패턴 사다리를 위에서부터 시도해 첫 매칭을 채택합니다.
//! 엄격 형식([`ParseKind::Complete`])만 인제스트 파이프라인에 수락되며,
//! 나머지 관용 형식은 레거시 히스토리 임포트가 사용합니다.

pub mod line;

pub use line::{parse_client_ts, parse_line, ParseKind};
