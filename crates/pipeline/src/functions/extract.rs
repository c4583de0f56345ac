//! 키 추출 함수
//!
//! | 이름 | 인자 | 결과 |
//! |------|------|------|
//! | `identity` | `[col]` | `(row[col], "")` |
//! | `double_identity` | `[key_col, subkey_col]` | `(row[key_col], row[subkey_col])` |
//! | `string` | `[text]` | 상수 키 (기본 `row_count`) |
//! | `re_match_one` | `[col, re]` | 첫 번째 캡처 그룹 |
//! | `re_match_two` | `[col, re]` | 두 번째 캡처 그룹 |
//! | `re_match_both` | `[col1, re1, col2, re2]` | `"{g1}-{g1}"` |
//! | `re_match_both2` | `[col1, re1, col2, re2]` | `"{g1}-g1"` 또는 `"{g1}-g2"` |
//! | `re_match_one_rcnz` | `[col, re, rcode_col, ext_rcode_col]` | rcode가 0이 아닐 때만 첫 번째 그룹 |

use regex::Regex;
use timebin_core::spec::Arg;
use timebin_core::types::Row;

use super::{column_arg, regex_arg, require_args};
use crate::error::AnalysisError;
use crate::registry::{Extractor, FunctionRegistry};

/// `string` 추출 함수의 기본 키
pub const DEFAULT_CONSTANT_KEY: &str = "row_count";

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_extractor("identity", |args| Ok(Box::new(Identity::new(args)?)))
        .register_extractor("double_identity", |args| {
            Ok(Box::new(DoubleIdentity::new(args)?))
        })
        .register_extractor("string", |args| Ok(Box::new(ConstantKey::new(args))))
        .register_extractor("re_match_one", |args| {
            Ok(Box::new(RegexGroup::new("re_match_one", args, 1)?))
        })
        .register_extractor("re_match_two", |args| {
            Ok(Box::new(RegexGroup::new("re_match_two", args, 2)?))
        })
        .register_extractor("re_match_both", |args| {
            Ok(Box::new(RegexPair::new("re_match_both", args, PairKey::Joined)?))
        })
        .register_extractor("re_match_both2", |args| {
            Ok(Box::new(RegexPair::new("re_match_both2", args, PairKey::GroupMarker)?))
        })
        .register_extractor("re_match_one_rcnz", |args| {
            Ok(Box::new(RegexNonZeroRcode::new(args)?))
        });
}

/// 한 컬럼의 값을 키로 사용합니다.
pub struct Identity {
    column: usize,
}

impl Identity {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            column: column_arg("identity", args, 0)?,
        })
    }
}

impl Extractor for Identity {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        Some((row.text(self.column).into_owned(), String::new()))
    }
}

/// 두 컬럼의 값을 키와 보조 키로 사용합니다.
pub struct DoubleIdentity {
    key: usize,
    subkey: usize,
}

impl DoubleIdentity {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            key: column_arg("double_identity", args, 0)?,
            subkey: column_arg("double_identity", args, 1)?,
        })
    }
}

impl Extractor for DoubleIdentity {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        Some((
            row.text(self.key).into_owned(),
            row.text(self.subkey).into_owned(),
        ))
    }
}

/// 모든 행에 같은 키를 돌려줍니다. 행 수를 셀 때 사용합니다.
pub struct ConstantKey {
    key: String,
}

impl ConstantKey {
    pub fn new(args: &[Arg]) -> Self {
        let key = args
            .first()
            .map_or_else(|| DEFAULT_CONSTANT_KEY.to_owned(), |a| a.text().into_owned());
        Self { key }
    }
}

impl Extractor for ConstantKey {
    fn extract(&mut self, _row: &Row) -> Option<(String, String)> {
        Some((self.key.clone(), String::new()))
    }
}

/// 정규식의 특정 캡처 그룹을 키로 사용합니다.
pub struct RegexGroup {
    column: usize,
    regex: Regex,
    group: usize,
}

impl RegexGroup {
    pub fn new(function: &str, args: &[Arg], group: usize) -> Result<Self, AnalysisError> {
        require_args(function, args, 2)?;
        Ok(Self {
            column: column_arg(function, args, 0)?,
            regex: regex_arg(function, args, 1)?,
            group,
        })
    }
}

impl Extractor for RegexGroup {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        let text = row.text(self.column);
        let captures = self.regex.captures(&text)?;
        let key = captures.get(self.group)?.as_str().to_owned();
        Some((key, String::new()))
    }
}

/// 두 컬럼 정규식 매치의 키 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKey {
    /// `"{첫 매치 그룹 1}-{둘째 매치 그룹 1}"`
    Joined,
    /// `"{첫 매치 그룹 1}-g1"` 또는 둘째 매치에서 그룹 1이 비었으면 `-g2`
    GroupMarker,
}

/// 두 컬럼에 각각 정규식을 적용하고, 둘 다 매치될 때만 키를 만듭니다.
pub struct RegexPair {
    first: (usize, Regex),
    second: (usize, Regex),
    mode: PairKey,
}

impl RegexPair {
    pub fn new(function: &str, args: &[Arg], mode: PairKey) -> Result<Self, AnalysisError> {
        require_args(function, args, 4)?;
        Ok(Self {
            first: (column_arg(function, args, 0)?, regex_arg(function, args, 1)?),
            second: (column_arg(function, args, 2)?, regex_arg(function, args, 3)?),
            mode,
        })
    }
}

impl Extractor for RegexPair {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        let first_text = row.text(self.first.0);
        let second_text = row.text(self.second.0);
        let first = self.first.1.captures(&first_text)?;
        let second = self.second.1.captures(&second_text)?;
        let lead = first.get(1).map_or("", |m| m.as_str());

        let key = match self.mode {
            PairKey::Joined => {
                let tail = second.get(1).map_or("", |m| m.as_str());
                format!("{lead}-{tail}")
            }
            PairKey::GroupMarker => {
                let marker = match (second.get(1), second.get(2)) {
                    (None, None) => return None,
                    (Some(_), _) => "g1",
                    (None, Some(_)) => "g2",
                };
                format!("{lead}-{marker}")
            }
        };
        Some((key, String::new()))
    }
}

/// 응답 코드(rcode) 또는 확장 응답 코드가 0이 아닌 행에만 `re_match_one`을 적용합니다.
pub struct RegexNonZeroRcode {
    inner: RegexGroup,
    rcode: usize,
    extended_rcode: usize,
}

impl RegexNonZeroRcode {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        require_args("re_match_one_rcnz", args, 4)?;
        Ok(Self {
            inner: RegexGroup::new("re_match_one_rcnz", &args[..2], 1)?,
            rcode: column_arg("re_match_one_rcnz", args, 2)?,
            extended_rcode: column_arg("re_match_one_rcnz", args, 3)?,
        })
    }
}

impl Extractor for RegexNonZeroRcode {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        let nonzero = |pos: usize| row.get(pos).and_then(|f| f.as_i64()).unwrap_or(0) > 0;
        if nonzero(self.rcode) || nonzero(self.extended_rcode) {
            self.inner.extract(row)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebin_core::row;

    fn text(s: &str) -> Arg {
        Arg::Text(s.to_owned())
    }

    #[test]
    fn identity_reads_one_column() {
        let mut f = Identity::new(&[Arg::Column(1)]).expect("valid");
        assert_eq!(
            f.extract(&row![10.5, "valueA", 40]),
            Some(("valueA".to_owned(), String::new()))
        );
    }

    #[test]
    fn identity_out_of_range_column_yields_empty_key() {
        let mut f = Identity::new(&[Arg::Column(7)]).expect("valid");
        let (key, _) = f.extract(&row!["a"]).expect("always some");
        assert!(key.is_empty());
    }

    #[test]
    fn identity_requires_column() {
        assert!(Identity::new(&[text("qname")]).is_err());
    }

    #[test]
    fn double_identity_reads_key_and_subkey() {
        let mut f = DoubleIdentity::new(&[Arg::Column(0), Arg::Int(2)]).expect("valid");
        assert_eq!(
            f.extract(&row!["a", "b", "c"]),
            Some(("a".to_owned(), "c".to_owned()))
        );
    }

    #[test]
    fn constant_key_defaults_to_row_count() {
        let mut f = ConstantKey::new(&[]);
        assert_eq!(f.extract(&row![]).map(|k| k.0), Some("row_count".to_owned()));
        let mut g = ConstantKey::new(&[Arg::Int(2)]);
        assert_eq!(g.extract(&row![]).map(|k| k.0), Some("2".to_owned()));
    }

    #[test]
    fn regex_group_one_and_two() {
        let args = [Arg::Column(0), text(r"^(\w+)\.(\w+)")];
        let mut one = RegexGroup::new("re_match_one", &args, 1).expect("valid");
        let mut two = RegexGroup::new("re_match_two", &args, 2).expect("valid");
        let row = row!["www.example.com"];
        assert_eq!(one.extract(&row).map(|k| k.0), Some("www".to_owned()));
        assert_eq!(two.extract(&row).map(|k| k.0), Some("example".to_owned()));
        assert_eq!(one.extract(&row!["---"]), None);
    }

    #[test]
    fn regex_pair_joined() {
        let args = [Arg::Column(0), text(r"(\d+)"), Arg::Column(1), text(r"([a-z]+)")];
        let mut f = RegexPair::new("re_match_both", &args, PairKey::Joined).expect("valid");
        assert_eq!(
            f.extract(&row!["port 53", "udp!"]).map(|k| k.0),
            Some("53-udp".to_owned())
        );
        assert_eq!(f.extract(&row!["none", "udp"]), None);
    }

    #[test]
    fn regex_pair_group_marker() {
        let args = [
            Arg::Column(0),
            text(r"(\d+)"),
            Arg::Column(1),
            text(r"(?:(tcp)|(udp))"),
        ];
        let mut f = RegexPair::new("re_match_both2", &args, PairKey::GroupMarker).expect("valid");
        assert_eq!(f.extract(&row!["53", "tcp"]).map(|k| k.0), Some("53-g1".to_owned()));
        assert_eq!(f.extract(&row!["53", "udp"]).map(|k| k.0), Some("53-g2".to_owned()));
    }

    #[test]
    fn rcnz_only_matches_failed_responses() {
        let args = [Arg::Column(0), text(r"^([^.]+)"), Arg::Column(1), Arg::Column(2)];
        let mut f = RegexNonZeroRcode::new(&args).expect("valid");
        assert_eq!(f.extract(&row!["host.example", "0", "0"]), None);
        assert_eq!(
            f.extract(&row!["host.example", "3", "0"]).map(|k| k.0),
            Some("host".to_owned())
        );
        assert_eq!(
            f.extract(&row!["host.example", "0", "1"]).map(|k| k.0),
            Some("host".to_owned())
        );
        assert_eq!(f.extract(&row!["host.example", "x", ""]), None);
    }

    #[test]
    fn invalid_regex_fails_at_construction() {
        let args = [Arg::Column(0), text("(")];
        assert!(RegexGroup::new("re_match_one", &args, 1).is_err());
    }
}
