//! 긴 형식(long format) 변화 탐지
//!
//! 넓은 행 `(time, key, col1, col2, ...)`을 컬럼마다 `(series, time, value)` 행으로
//! 펼치고([`LongFormat`]), 같은 시리즈끼리 모인 스트림에 시리즈마다 새 검출기를
//! 돌립니다([`GroupedEdgeDetector`]). 시리즈 이름은 `<column>-<key>`이며,
//! 컬럼 이름 부분으로 컬럼별 임계값을 찾습니다.
//!
//! 외부 정렬기(`sort -k1,1`)나 map/reduce 셔플로 시리즈별 그룹을 만든 뒤 쓰는 경로입니다.
//! 그룹 안의 행은 시간순이 아니어도 됩니다.

use timebin_core::error::TimebinError;
use timebin_core::pipeline::Stage;
use timebin_core::spec::ArgSpec;
use timebin_core::types::{Field, Row, Schema, time_bin};

use crate::config::EdgeDetectConfig;
use crate::detector::{EdgeDetector, EdgeEvent};
use crate::error::EdgeDetectError;

const STAGE: &str = "edge_detect_grouped";

/// 긴 형식 행의 컬럼
pub const LONG_COLUMNS: [&str; 3] = ["series", "time", "value"];

/// 시리즈 이름에서 컬럼과 키를 나누는 기본 구분자
pub const DEFAULT_SEPARATOR: char = '-';

/// 넓은 행을 긴 형식으로 펼치는 규칙
#[derive(Debug, Clone)]
pub struct LongFormat {
    time_column: usize,
    key_column: usize,
    columns: Vec<(String, usize)>,
    separator: char,
}

impl LongFormat {
    /// `columns`가 비어 있으면 시간, 키, `subkey`를 제외한 모든 컬럼을 펼칩니다.
    pub fn new(
        schema: &Schema,
        time_column: &ArgSpec,
        key_column: &ArgSpec,
        columns: &[String],
    ) -> Result<Self, EdgeDetectError> {
        let time_column = time_column.resolve_column(schema)?;
        let key_column = key_column.resolve_column(schema)?;

        let columns = if columns.is_empty() {
            schema
                .columns()
                .iter()
                .enumerate()
                .filter(|(pos, name)| {
                    *pos != time_column && *pos != key_column && name.as_str() != "subkey"
                })
                .map(|(pos, name)| (name.clone(), pos))
                .collect()
        } else {
            columns
                .iter()
                .map(|name| {
                    let pos = ArgSpec::Text(name.clone()).resolve_column(schema)?;
                    Ok((name.clone(), pos))
                })
                .collect::<Result<Vec<_>, EdgeDetectError>>()?
        };
        if columns.is_empty() {
            return Err(EdgeDetectError::invalid("columns", "no value columns to explode"));
        }

        Ok(Self {
            time_column,
            key_column,
            columns,
            separator: DEFAULT_SEPARATOR,
        })
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// 펼칠 컬럼 이름
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// 넓은 행 하나를 값이 있는 컬럼마다 `(series, time, value)` 행으로 펼칩니다.
    pub fn to_long_rows(&self, row: &Row) -> Vec<Row> {
        let key = row.text(self.key_column);
        let time = row.get(self.time_column).cloned().unwrap_or(Field::Empty);
        self.columns
            .iter()
            .filter_map(|(name, pos)| {
                let value = row.get(*pos).filter(|f| !f.is_empty())?;
                Some(Row::new(vec![
                    Field::Text(format!("{name}{}{key}", self.separator)),
                    time.clone(),
                    value.clone(),
                ]))
            })
            .collect()
    }
}

/// 긴 형식 변화 탐지 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupedStats {
    pub rows: u64,
    /// 시간이나 값이 숫자가 아니어서 건너뛴 행 수
    pub skipped: u64,
    pub groups: u64,
    pub events: u64,
}

/// 시리즈별로 묶인 긴 형식 행을 처리하는 스테이지
pub struct GroupedEdgeDetector {
    config: EdgeDetectConfig,
    separator: char,
    current: Option<String>,
    group: Vec<(f64, f64)>,
    stats: GroupedStats,
}

impl GroupedEdgeDetector {
    pub fn new(config: EdgeDetectConfig) -> Result<Self, EdgeDetectError> {
        config.validate()?;
        tracing::info!(
            window_size = config.window_size,
            middle_size = config.middle_size,
            overrides = config.columns.len(),
            "grouped edge detector ready"
        );
        Ok(Self {
            config,
            separator: DEFAULT_SEPARATOR,
            current: None,
            group: Vec::new(),
            stats: GroupedStats::default(),
        })
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// 출력 헤더
    pub fn header(&self) -> Vec<String> {
        ["timestamp", "series", "lhs", "rhs", "scale", "delta"]
            .map(str::to_owned)
            .to_vec()
    }

    pub fn stats(&self) -> GroupedStats {
        self.stats
    }

    /// 현재 그룹을 시간순으로 정렬해 새 검출기로 처리합니다.
    fn run_group(&mut self, out: &mut Vec<EdgeEvent>) -> Result<(), TimebinError> {
        let Some(series) = self.current.take() else {
            return Ok(());
        };
        let mut samples = std::mem::take(&mut self.group);
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let column = series
            .split_once(self.separator)
            .map_or(series.as_str(), |(column, _)| column);
        let mut detector = EdgeDetector::for_series(&self.config, column);
        for (time, value) in &samples {
            detector.observe(&series, *time, &[Some(*value)], out)?;
        }
        detector.finish(out)?;

        let events = detector.stats().events;
        self.stats.groups += 1;
        self.stats.events += events;
        tracing::trace!(series = %series, samples = samples.len(), events, "series analyzed");
        Ok(())
    }
}

impl Stage for GroupedEdgeDetector {
    type Input = Row;
    type Output = EdgeEvent;

    fn name(&self) -> &'static str {
        STAGE
    }

    fn push(&mut self, row: Row, out: &mut Vec<EdgeEvent>) -> Result<(), TimebinError> {
        self.stats.rows += 1;
        let bin_size = self.config.bin_size;
        let time = row.number(1).filter(|t| time_bin(*t, bin_size).is_some());
        let (Some(time), Some(value)) = (time, row.number(2)) else {
            self.stats.skipped += 1;
            return Ok(());
        };
        let series = row.text(0);
        if self.current.as_deref() != Some(series.as_ref()) {
            self.run_group(out)?;
            self.current = Some(series.into_owned());
        }
        self.group.push((time, value));
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<EdgeEvent>) -> Result<(), TimebinError> {
        self.run_group(out)?;
        tracing::debug!(
            groups = self.stats.groups,
            events = self.stats.events,
            "grouped edge detector finished"
        );
        Ok(())
    }

    fn discard(&mut self) -> usize {
        self.current = None;
        let dropped = self.group.len();
        self.group.clear();
        dropped
    }
}
