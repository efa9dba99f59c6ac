//! CIDR ACL — 리스너 수신 허용/거부 평가
//!
//! 설정의 `[[acl]]` 블록이 이 타입들로 역직렬화됩니다.
//! 규칙은 순서대로 평가되며 첫 번째로 매칭되는 규칙의 action이 결과를
//! 결정합니다. 매칭되는 규칙이 없으면 거부입니다.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 파싱된 CIDR 프리픽스
///
/// IPv4는 u32, IPv6는 u128 마스크 비교로 매칭합니다.
/// 주소 패밀리가 다르면 매칭되지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrPrefix {
    network: u128,
    mask: u128,
    is_v4: bool,
    prefix_len: u8,
}

impl CidrPrefix {
    /// `"10.0.0.0/8"` 또는 `"fd00::/8"` 형태의 문자열을 파싱합니다.
    ///
    /// 프리픽스 길이가 생략되면 단일 호스트(/32 또는 /128)로 간주합니다.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            field: "cidr".to_owned(),
            reason,
        };

        let (addr_str, len_str) = match s.split_once('/') {
            Some((a, l)) => (a, Some(l)),
            None => (s, None),
        };

        let addr = IpAddr::from_str(addr_str)
            .map_err(|e| invalid(format!("bad address in '{s}': {e}")))?;

        let max_len: u8 = if addr.is_ipv4() { 32 } else { 128 };
        let prefix_len: u8 = match len_str {
            Some(l) => l
                .parse()
                .map_err(|e| invalid(format!("bad prefix length in '{s}': {e}")))?,
            None => max_len,
        };
        if prefix_len > max_len {
            return Err(invalid(format!(
                "prefix length {prefix_len} exceeds {max_len} in '{s}'"
            )));
        }

        let (bits, width) = match addr {
            IpAddr::V4(v4) => (u128::from(u32::from(v4)), 32u32),
            IpAddr::V6(v6) => (u128::from(v6), 128u32),
        };
        let mask: u128 = if prefix_len == 0 {
            0
        } else {
            let shift = width - u32::from(prefix_len);
            (!0u128 >> (128 - width)) << shift & (!0u128 >> (128 - width))
        };

        Ok(Self {
            network: bits & mask,
            mask,
            is_v4: addr.is_ipv4(),
            prefix_len,
        })
    }

    /// 주소가 이 프리픽스에 속하는지 확인합니다.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                self.is_v4 && (u128::from(u32::from(v4)) & self.mask) == self.network
            }
            IpAddr::V6(v6) => !self.is_v4 && (u128::from(v6) & self.mask) == self.network,
        }
    }

    /// 프리픽스 길이를 반환합니다.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}

/// ACL 규칙 action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    /// 허용
    Allow,
    /// 거부
    Deny,
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// 단일 ACL 규칙 (설정 파일 형태)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRule {
    /// CIDR 표기 프리픽스
    pub cidr: String,
    /// 매칭 시 동작
    pub action: AclAction,
    /// 운영자용 규칙 이름
    pub name: String,
}

/// 이름 붙은 순서 있는 CIDR 규칙 목록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acl {
    /// ACL 식별자 (테넌트/리스너가 참조)
    pub id: String,
    /// 평가 순서대로의 규칙 목록
    pub rules: Vec<AclRule>,
}

/// 평가 준비가 끝난 ACL — 프리픽스가 미리 파싱된 형태
#[derive(Debug, Clone)]
pub struct CompiledAcl {
    rules: Vec<(CidrPrefix, AclAction)>,
}

impl CompiledAcl {
    /// 설정 ACL의 모든 규칙을 파싱합니다.
    pub fn compile(acl: &Acl) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(acl.rules.len());
        for rule in &acl.rules {
            let prefix = CidrPrefix::parse(&rule.cidr).map_err(|e| ConfigError::InvalidValue {
                field: format!("acl[{}].rules[{}].cidr", acl.id, rule.name),
                reason: e.to_string(),
            })?;
            rules.push((prefix, rule.action));
        }
        Ok(Self { rules })
    }

    /// 첫 매칭 규칙의 action을 반환합니다. 매칭이 없으면 거부입니다.
    pub fn permits(&self, ip: IpAddr) -> bool {
        for (prefix, action) in &self.rules {
            if prefix.contains(ip) {
                return *action == AclAction::Allow;
            }
        }
        false
    }

    /// 규칙 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
