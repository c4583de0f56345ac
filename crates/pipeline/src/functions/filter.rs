//! 행 필터
//!
//! - `exclude_exprs [col, re...]`: 하나라도 매치되면 버림
//! - `include_exprs [col, re...]`: 하나라도 매치될 때만 유지

use regex::RegexSet;
use timebin_core::spec::Arg;
use timebin_core::types::Row;

use super::column_arg;
use crate::error::AnalysisError;
use crate::registry::{FunctionRegistry, RowFilter};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_filter("exclude_exprs", |args| {
            Ok(Box::new(RegexFilter::new("exclude_exprs", args, FilterMode::Exclude)?))
        })
        .register_filter("include_exprs", |args| {
            Ok(Box::new(RegexFilter::new("include_exprs", args, FilterMode::Include)?))
        });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Exclude,
    Include,
}

/// 한 컬럼에 정규식 집합을 적용하는 필터
pub struct RegexFilter {
    column: usize,
    patterns: RegexSet,
    mode: FilterMode,
}

impl RegexFilter {
    pub fn new(function: &str, args: &[Arg], mode: FilterMode) -> Result<Self, AnalysisError> {
        let column = column_arg(function, args, 0)?;
        let patterns: Vec<String> = args[1..].iter().map(|a| a.text().into_owned()).collect();
        if patterns.is_empty() {
            return Err(AnalysisError::invalid_args(
                function,
                "expected at least one pattern after the column",
            ));
        }
        let patterns = RegexSet::new(&patterns).map_err(|source| AnalysisError::Regex {
            function: function.to_owned(),
            source,
        })?;
        Ok(Self {
            column,
            patterns,
            mode,
        })
    }
}

impl RowFilter for RegexFilter {
    fn keep(&mut self, row: &Row) -> bool {
        let matched = self.patterns.is_match(&row.text(self.column));
        match self.mode {
            FilterMode::Exclude => !matched,
            FilterMode::Include => matched,
        }
    }
}
