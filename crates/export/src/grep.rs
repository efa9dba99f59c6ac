//! Grep 파이프라인 -- 최대 3개 정규식의 AND 매칭과 ANSI 하이라이트
//!
//! 매칭은 설정된 모든 패턴의 논리곱입니다 (미설정 패턴은 항상 참).
//! `color=always`일 때 각 패턴의 매칭 구간을 순서대로
//! 빨강/초록/노랑으로 감쌉니다.

use regex::Regex;

use crate::error::ExportError;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_COLORS: [&str; 3] = ["\x1b[31m", "\x1b[32m", "\x1b[33m"]; // red, green, yellow

/// 정규식 메타문자 집합. 이 문자가 없으면 단순 부분 문자열로 취급해
/// SQL 측에서 ILIKE로 내려보낼 수 있습니다.
const REGEX_META: &[char] = &[
    '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '\\',
];

/// 하이라이트 색상 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// 색상 없음 (기본값)
    #[default]
    Never,
    /// 매칭 구간을 ANSI 색상으로 감쌈
    Always,
}

impl ColorMode {
    /// 쿼리 파라미터 값을 파싱합니다. 빈 문자열은 `Never`입니다.
    pub fn parse(value: &str) -> Result<Self, ExportError> {
        match value {
            "" | "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            other => Err(ExportError::BadQuery(format!(
                "invalid color={other:?} (use never|always)"
            ))),
        }
    }
}

/// 컴파일된 grep 파이프라인
#[derive(Debug, Default)]
pub struct GrepPipeline {
    patterns: [Option<Regex>; 3],
    color: ColorMode,
}

impl GrepPipeline {
    /// 최대 3개의 패턴을 컴파일합니다. 빈 패턴은 건너뜁니다.
    pub fn compile(
        grep1: &str,
        grep2: &str,
        grep3: &str,
        color: ColorMode,
    ) -> Result<Self, ExportError> {
        let compile_one = |name: &str, pattern: &str| -> Result<Option<Regex>, ExportError> {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                return Ok(None);
            }
            Regex::new(pattern)
                .map(Some)
                .map_err(|e| ExportError::BadQuery(format!("invalid {name}: {e}")))
        };

        Ok(Self {
            patterns: [
                compile_one("grep1", grep1)?,
                compile_one("grep2", grep2)?,
                compile_one("grep3", grep3)?,
            ],
            color,
        })
    }

    /// 색상 출력 여부를 반환합니다.
    pub fn color_enabled(&self) -> bool {
        self.color == ColorMode::Always
    }

    /// 설정된 모든 패턴이 라인에 매칭되는지 확인합니다.
    pub fn matches(&self, line: &str) -> bool {
        self.patterns
            .iter()
            .flatten()
            .all(|re| re.is_match(line))
    }

    /// 각 패턴의 매칭 구간을 ANSI 색상으로 감쌉니다.
    pub fn highlight(&self, line: &str) -> String {
        if !self.color_enabled() {
            return line.to_owned();
        }
        let mut out = line.to_owned();
        for (re, color) in self.patterns.iter().zip(ANSI_COLORS) {
            if let Some(re) = re {
                out = re
                    .replace_all(&out, |caps: &regex::Captures<'_>| {
                        format!("{color}{}{ANSI_RESET}", &caps[0])
                    })
                    .into_owned();
            }
        }
        out
    }
}

/// 패턴이 정규식 메타문자를 포함하지 않는 단순 부분 문자열인지
/// 확인합니다.
pub fn is_plain_substring(pattern: &str) -> bool {
    !pattern.contains(REGEX_META)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipeline_matches_everything() {
        let pipe = GrepPipeline::compile("", "", "", ColorMode::Never).unwrap();
        assert!(pipe.matches("anything at all"));
        assert!(pipe.matches(""));
    }

    #[test]
    fn match_is_conjunction_of_patterns() {
        let pipe = GrepPipeline::compile("ssh", "root", "", ColorMode::Never).unwrap();
        assert!(pipe.matches("ssh root@host"));
        assert!(!pipe.matches("ssh admin@host"));
        assert!(!pipe.matches("telnet root@host"));
    }

    #[test]
    fn three_patterns_all_required() {
        let pipe = GrepPipeline::compile("a", "b", "c", ColorMode::Never).unwrap();
        assert!(pipe.matches("abc"));
        assert!(!pipe.matches("ab"));
    }

    #[test]
    fn bad_pattern_is_a_bad_query() {
        let err = GrepPipeline::compile("(", "", "", ColorMode::Never).unwrap_err();
        assert!(err.to_string().contains("grep1"));

        let err = GrepPipeline::compile("", "[z", "", ColorMode::Never).unwrap_err();
        assert!(err.to_string().contains("grep2"));
    }

    #[test]
    fn highlight_wraps_first_pattern_in_red() {
        let pipe = GrepPipeline::compile("ssh", "", "", ColorMode::Always).unwrap();
        let out = pipe.highlight("run ssh now");
        assert_eq!(out, "run \x1b[31mssh\x1b[0m now");
    }

    #[test]
    fn highlight_uses_distinct_colors_per_pattern() {
        let pipe = GrepPipeline::compile("one", "two", "three", ColorMode::Always).unwrap();
        let out = pipe.highlight("one two three");
        assert!(out.contains("\x1b[31mone\x1b[0m"));
        assert!(out.contains("\x1b[32mtwo\x1b[0m"));
        assert!(out.contains("\x1b[33mthree\x1b[0m"));
    }

    #[test]
    fn highlight_without_color_is_identity() {
        let pipe = GrepPipeline::compile("ssh", "", "", ColorMode::Never).unwrap();
        assert_eq!(pipe.highlight("run ssh now"), "run ssh now");
        assert!(!pipe.color_enabled());
    }

    #[test]
    fn plain_substring_detection() {
        assert!(is_plain_substring(""));
        assert!(is_plain_substring("ssh root"));
        assert!(is_plain_substring("호스트"));
        assert!(!is_plain_substring("ssh.*root"));
        assert!(!is_plain_substring("a+b"));
        assert!(!is_plain_substring("^start"));
        assert!(!is_plain_substring("back\\slash"));
    }

    #[test]
    fn color_mode_parse() {
        assert_eq!(ColorMode::parse("").unwrap(), ColorMode::Never);
        assert_eq!(ColorMode::parse("never").unwrap(), ColorMode::Never);
        assert_eq!(ColorMode::parse("always").unwrap(), ColorMode::Always);
        assert!(ColorMode::parse("auto").is_err());
    }
}
