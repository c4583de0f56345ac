//! 내장 함수 라이브러리
//!
//! - [`extract`]: 키 추출 함수 (identity, 정규식 그룹 등)
//! - [`value`]: 값 함수 (one, column_value, fraction 등)
//! - [`combine`]: 결합 함수 (sum, max)
//! - [`filter`]: 행 필터 (exclude_exprs, include_exprs)
//! - [`relationship`]: 번들 참조 함수 (value, fraction, lookup 등)
//! - [`aggregate`]: 집계 전략 (sum, sumAndCountUnique, unique 등)
//! - [`dns`]: 도메인 접미사 분류기와 DNS 전용 함수

pub mod aggregate;
pub mod combine;
pub mod dns;
pub mod extract;
pub mod filter;
pub mod relationship;
pub mod value;

use std::sync::Arc;

use regex::Regex;
use timebin_core::spec::Arg;

use crate::error::AnalysisError;
use crate::registry::FunctionRegistry;

use self::dns::DomainClassifier;

/// 모든 내장 함수를 등록합니다.
pub fn register_builtins(registry: &mut FunctionRegistry, classifier: Arc<dyn DomainClassifier>) {
    extract::register(registry);
    value::register(registry);
    combine::register(registry);
    filter::register(registry);
    relationship::register(registry);
    aggregate::register(registry);
    dns::register(registry, classifier);
}

/// 최소 인자 개수를 검사합니다.
pub(crate) fn require_args(function: &str, args: &[Arg], n: usize) -> Result<(), AnalysisError> {
    if args.len() < n {
        return Err(AnalysisError::invalid_args(
            function,
            format!("expected at least {n} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

/// `pos`번째 인자를 컬럼 위치로 가져옵니다.
pub(crate) fn column_arg(function: &str, args: &[Arg], pos: usize) -> Result<usize, AnalysisError> {
    let arg = args.get(pos).ok_or_else(|| {
        AnalysisError::invalid_args(function, format!("missing column argument #{}", pos + 1))
    })?;
    arg.column().ok_or_else(|| {
        AnalysisError::invalid_args(
            function,
            format!("argument #{} '{}' is not a column", pos + 1, arg.text()),
        )
    })
}

/// `pos`번째 인자를 문자열로 가져옵니다.
pub(crate) fn text_arg(function: &str, args: &[Arg], pos: usize) -> Result<String, AnalysisError> {
    args.get(pos)
        .map(|a| a.text().into_owned())
        .ok_or_else(|| {
            AnalysisError::invalid_args(function, format!("missing argument #{}", pos + 1))
        })
}

/// 선택 인자를 문자열로 가져옵니다.
pub(crate) fn optional_text(args: &[Arg], pos: usize) -> Option<String> {
    args.get(pos).map(|a| a.text().into_owned())
}

/// `pos`번째 인자를 정규식으로 컴파일합니다.
pub(crate) fn regex_arg(function: &str, args: &[Arg], pos: usize) -> Result<Regex, AnalysisError> {
    let pattern = text_arg(function, args, pos)?;
    Regex::new(&pattern).map_err(|source| AnalysisError::Regex {
        function: function.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_args_counts() {
        assert!(require_args("f", &[Arg::Int(1)], 1).is_ok());
        let err = require_args("f", &[], 2).expect_err("too few");
        assert!(err.to_string().contains("at least 2"));
    }

    #[test]
    fn column_arg_accepts_columns_and_positions() {
        let args = [Arg::Column(3), Arg::Int(1), Arg::Text("x".to_owned())];
        assert_eq!(column_arg("f", &args, 0).ok(), Some(3));
        assert_eq!(column_arg("f", &args, 1).ok(), Some(1));
        assert!(column_arg("f", &args, 2).is_err());
        assert!(column_arg("f", &args, 3).is_err());
    }

    #[test]
    fn regex_arg_reports_bad_patterns() {
        let args = [Arg::Text("(unclosed".to_owned())];
        let err = regex_arg("re_match_one", &args, 0).expect_err("bad regex");
        assert!(matches!(err, AnalysisError::Regex { .. }));
    }
}
