//! デプロイ prefix
//!
//! 全リソース名の名前空間となる文字列。バケット名・ロードバランサー名の
//! 制約を満たす範囲に限定する。

use crate::error::{CoreError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ALB / ターゲットグループ名の上限 (32) から逆算した長さ
pub const MAX_PREFIX_LEN: usize = 20;

const PREFIX_PATTERN: &str = r"^[a-z](?:[a-z0-9]|-[a-z0-9])*$";

/// 検証済みの prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix(String);

impl Prefix {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let invalid = |reason: &str| CoreError::InvalidPrefix {
            prefix: value.clone(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("空文字は使用できません"));
        }
        if value.len() > MAX_PREFIX_LEN {
            return Err(invalid(&format!("{}文字以内で指定してください", MAX_PREFIX_LEN)));
        }
        let pattern = Regex::new(PREFIX_PATTERN)
            .map_err(|e| CoreError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;
        if !pattern.is_match(&value) {
            return Err(invalid(
                "英小文字で始まり、英小文字・数字・ハイフンのみ使用できます（末尾・連続ハイフン不可）",
            ));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Prefix {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Prefix {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_prefixes() {
        for value in ["acme", "a", "team-a", "dev2", "x1-y2-z3"] {
            assert!(Prefix::new(value).is_ok(), "{} should be valid", value);
        }
    }

    #[test]
    fn test_invalid_prefixes() {
        for value in [
            "",
            "Acme",
            "1acme",
            "acme-",
            "ac--me",
            "acme_dev",
            "acme.dev",
            "-acme",
        ] {
            assert!(Prefix::new(value).is_err(), "{} should be invalid", value);
        }
    }

    #[test]
    fn test_prefix_length_limit() {
        let ok = "a".repeat(MAX_PREFIX_LEN);
        let too_long = "a".repeat(MAX_PREFIX_LEN + 1);
        assert!(Prefix::new(ok).is_ok());

        let err = Prefix::new(too_long).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPrefix { .. }));
    }

    #[test]
    fn test_prefix_serde() {
        let prefix: Prefix = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(prefix.as_str(), "acme");
        assert!(serde_json::from_str::<Prefix>("\"ACME\"").is_err());
    }
}
