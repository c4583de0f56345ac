//! Edge Detector -- 키별 시계열에서 급격한 증가/감소 찾기
//!
//! 행을 시간 구간으로 묶고, 키 x 분석 컬럼마다 [`AverageWindow`]를 하나씩 둡니다.
//!
//! # 처리 순서
//!
//! 1. 같은 구간에 들어온 같은 키의 값은 더해 두었다가 구간이 바뀔 때 한 번에 넣습니다.
//!    이번 구간에 나타나지 않은 키에는 0을 넣습니다.
//! 2. 관측된 구간 사이의 빈 구간마다 모든 윈도우에 0을 넣습니다.
//! 3. 새 구간의 첫 행에서 (첫 구간 + 윈도우 전체 길이) 이후라면 모든 윈도우를 검사합니다.
//! 4. 이벤트 시각은 탐지 시각에서 `(2 * window + middle - 1) * bin` 만큼 뺀 값입니다.
//!
//! 키는 처음 나타날 때 0으로 채운 윈도우로 시작합니다.
//! 이전 구간보다 작은 구간이 들어오면 치명적 에러입니다.

use std::collections::HashMap;

use serde::Serialize;
use timebin_core::error::TimebinError;
use timebin_core::metrics as m;
use timebin_core::pipeline::Stage;
use timebin_core::spec::ArgSpec;
use timebin_core::types::{Field, Row, Schema, time_bin};

use crate::config::{EdgeDetectConfig, Thresholds};
use crate::error::EdgeDetectError;
use crate::window::AverageWindow;

const STAGE: &str = "edge_detect";

/// 한 컬럼의 윈도우 합과 이벤트 값 (이벤트가 없으면 0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnReading {
    pub lhs: f64,
    pub rhs: f64,
    /// 배율 이벤트: 상승이면 `rhs/lhs`, 하락이면 `-(lhs/rhs)`
    pub scale: f64,
    /// 차이 이벤트: `rhs - lhs`
    pub delta: f64,
}

/// 이벤트 행. 한 컬럼이라도 이벤트가 있으면 모든 컬럼 값을 담습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeEvent {
    /// 변화가 시작된 구간 (탐지 시각 - 윈도우 보정)
    pub timestamp: i64,
    pub key: String,
    /// 분석 컬럼 순서
    pub columns: Vec<ColumnReading>,
}

impl EdgeEvent {
    /// `timestamp, key, (lhs, rhs, scale, delta)*` 행으로 변환합니다.
    pub fn into_row(self) -> Row {
        let mut fields = Vec::with_capacity(2 + 4 * self.columns.len());
        fields.push(Field::Int(self.timestamp));
        fields.push(Field::Text(self.key));
        for c in self.columns {
            fields.extend([c.lhs, c.rhs, c.scale, c.delta].map(Field::Float));
        }
        Row::new(fields)
    }
}

/// 분석 컬럼 하나의 위치와 임계값
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub name: String,
    pub position: usize,
    pub thresholds: Thresholds,
}

impl ColumnRule {
    /// 윈도우를 검사합니다. 이벤트가 하나라도 있으면 `true`를 함께 반환합니다.
    pub fn read(&self, window: &AverageWindow, min_interesting: f64) -> (ColumnReading, bool) {
        let lhs = window.lhs();
        let rhs = window.rhs();
        let min = self.thresholds.min_value;
        let mut reading = ColumnReading {
            lhs,
            rhs,
            scale: 0.0,
            delta: 0.0,
        };
        let mut fired = false;

        if let Some(jump) = self.thresholds.zero_jump {
            let rising = rhs - lhs > jump && rhs >= min;
            let falling = lhs - rhs > jump && lhs >= min;
            if rising || falling {
                reading.delta = rhs - lhs;
                fired = true;
            }
        }

        if let Some(height) = self.thresholds.scale_height {
            if lhs > min_interesting && rhs >= min && rhs / lhs > height {
                reading.scale = rhs / lhs;
                fired = true;
            } else if rhs > min_interesting && lhs >= min && lhs / rhs > height {
                reading.scale = -(lhs / rhs);
                fired = true;
            }
        }

        (reading, fired)
    }
}

/// 키 하나의 윈도우와 현재 구간 누적값
#[derive(Debug)]
struct Series {
    key: String,
    windows: Vec<AverageWindow>,
    pending: Option<Vec<f64>>,
}

/// Edge Detector 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetectStats {
    pub rows: u64,
    /// 시간 값이 숫자가 아니어서 건너뛴 행 수
    pub skipped: u64,
    /// 윈도우에 넣은 구간 수 (빈 구간 포함)
    pub bins: u64,
    pub events: u64,
}

/// 변화 탐지 스테이지
pub struct EdgeDetector {
    time_column: usize,
    key_column: usize,
    time_name: String,
    key_name: String,
    rules: Vec<ColumnRule>,
    bin_size: u32,
    window_size: usize,
    middle_size: usize,
    min_interesting: f64,
    event_offset: i64,
    series: Vec<Series>,
    positions: HashMap<String, usize>,
    current_bin: Option<i64>,
    first_analysis: i64,
    stats: EdgeDetectStats,
}

impl EdgeDetector {
    /// 입력 스키마에 대해 시간/키/분석 컬럼을 해석합니다.
    pub fn new(config: &EdgeDetectConfig, schema: &Schema) -> Result<Self, EdgeDetectError> {
        config.validate()?;
        if config.columns.is_empty() {
            return Err(EdgeDetectError::invalid(
                "analyzeColumns",
                "must name at least one column",
            ));
        }
        let time_column = config.time_column.resolve_column(schema)?;
        let key_column = config.key_column.resolve_column(schema)?;

        let mut rules = Vec::with_capacity(config.columns.len());
        for column in &config.columns {
            let position = ArgSpec::Text(column.name.clone()).resolve_column(schema)?;
            rules.push(ColumnRule {
                name: schema
                    .name(position)
                    .map_or_else(|| column.name.clone(), str::to_owned),
                position,
                thresholds: config.thresholds_for(&column.name),
            });
        }

        let detector = Self::with_rules(
            config,
            (time_column, schema.name(time_column).unwrap_or("timestamp")),
            (key_column, schema.name(key_column).unwrap_or("key")),
            rules,
        );
        tracing::info!(
            columns = detector.rules.len(),
            window_size = config.window_size,
            middle_size = config.middle_size,
            bin_size = config.bin_size,
            "edge detector ready"
        );
        Ok(detector)
    }

    /// `(series, time, value)` 긴 형식 행 하나의 시리즈를 위한 검출기.
    ///
    /// 임계값은 `column` 이름의 오버라이드를 씁니다.
    pub(crate) fn for_series(config: &EdgeDetectConfig, column: &str) -> Self {
        let rule = ColumnRule {
            name: column.to_owned(),
            position: 2,
            thresholds: config.thresholds_for(column),
        };
        Self::with_rules(config, (1, "timestamp"), (0, "series"), vec![rule])
    }

    fn with_rules(
        config: &EdgeDetectConfig,
        (time_column, time_name): (usize, &str),
        (key_column, key_name): (usize, &str),
        rules: Vec<ColumnRule>,
    ) -> Self {
        Self {
            time_column,
            key_column,
            time_name: time_name.to_owned(),
            key_name: key_name.to_owned(),
            rules,
            bin_size: config.bin_size,
            window_size: config.window_size,
            middle_size: config.middle_size,
            min_interesting: config.min_interesting,
            event_offset: config.event_offset(),
            series: Vec::new(),
            positions: HashMap::new(),
            current_bin: None,
            first_analysis: 0,
            stats: EdgeDetectStats::default(),
        }
    }

    /// 출력 헤더: `time, key, {col}_lhs, {col}_rhs, {col}_scale, {col}_delta ...`
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![self.time_name.clone(), self.key_name.clone()];
        for rule in &self.rules {
            for suffix in ["lhs", "rhs", "scale", "delta"] {
                header.push(format!("{}_{suffix}", rule.name));
            }
        }
        header
    }

    pub fn rules(&self) -> &[ColumnRule] {
        &self.rules
    }

    pub fn stats(&self) -> EdgeDetectStats {
        self.stats
    }

    /// 첫 검사 시각. 첫 행을 보기 전에는 `None`
    pub fn first_analysis_time(&self) -> Option<i64> {
        self.current_bin.map(|_| self.first_analysis)
    }

    fn span(&self) -> i64 {
        (2 * self.window_size + self.middle_size) as i64
    }

    /// 관측값 하나를 처리합니다. `values`는 분석 컬럼 순서입니다 (`None`은 0).
    ///
    /// 구간을 계산할 수 없는 시간(`NaN`, 무한대, 범위 밖)은 건너뛰고 `skipped`에 셉니다.
    pub fn observe(
        &mut self,
        key: &str,
        time: f64,
        values: &[Option<f64>],
        out: &mut Vec<EdgeEvent>,
    ) -> Result<(), EdgeDetectError> {
        let Some(bin) = time_bin(time, self.bin_size) else {
            self.stats.skipped += 1;
            tracing::trace!(key, time, "row with non-finite time skipped");
            return Ok(());
        };
        match self.current_bin {
            None => {
                self.first_analysis =
                    bin.saturating_add(i64::from(self.bin_size).saturating_mul(self.span()));
                self.current_bin = Some(bin);
                tracing::debug!(
                    first_bin = bin,
                    first_analysis = self.first_analysis,
                    "edge detector warming up"
                );
            }
            Some(current) if bin == current => {}
            Some(current) if bin < current => {
                return Err(EdgeDetectError::TimeWentBackwards {
                    stage: STAGE.to_owned(),
                    previous: current,
                    current: bin,
                    key: key.to_owned(),
                });
            }
            Some(current) => {
                self.commit();
                self.fill_gap(current, bin);
                if bin >= self.first_analysis {
                    self.analyze(bin, out);
                }
                self.current_bin = Some(bin);
            }
        }

        let idx = self.series_index(key)?;
        let width = self.rules.len();
        let pending = self.series[idx]
            .pending
            .get_or_insert_with(|| vec![0.0; width]);
        for (sum, value) in pending.iter_mut().zip(values) {
            *sum += value.unwrap_or(0.0);
        }
        Ok(())
    }

    fn series_index(&mut self, key: &str) -> Result<usize, EdgeDetectError> {
        if let Some(&idx) = self.positions.get(key) {
            return Ok(idx);
        }
        let windows = (0..self.rules.len())
            .map(|_| AverageWindow::new(self.window_size, self.middle_size))
            .collect::<Result<Vec<_>, _>>()?;
        let idx = self.series.len();
        self.series.push(Series {
            key: key.to_owned(),
            windows,
            pending: None,
        });
        self.positions.insert(key.to_owned(), idx);
        tracing::trace!(key, "tracking new series");
        Ok(idx)
    }

    /// 현재 구간의 누적값을 윈도우에 넣습니다. 나타나지 않은 키에는 0을 넣습니다.
    fn commit(&mut self) {
        for series in &mut self.series {
            match series.pending.take() {
                Some(sums) => {
                    for (window, value) in series.windows.iter_mut().zip(sums) {
                        window.add(value);
                    }
                }
                None => series.windows.iter_mut().for_each(|w| w.add(0.0)),
            }
        }
        self.stats.bins += 1;
        metrics::counter!(m::EDGE_DETECT_BINS_TOTAL).increment(1);
        metrics::counter!(m::STAGE_BINS_FLUSHED_TOTAL, m::LABEL_STAGE => STAGE).increment(1);
    }

    /// `from`과 `to` 사이의 빈 구간마다 모든 윈도우에 0을 넣습니다.
    ///
    /// `span()`개를 넘는 0은 윈도우를 바꾸지 않으므로 그만큼만 넣고,
    /// 나머지 빈 구간은 통계에만 반영합니다.
    fn fill_gap(&mut self, from: i64, to: i64) {
        let step = i64::from(self.bin_size.max(1));
        let gap = u64::try_from(to.saturating_sub(from) / step - 1).unwrap_or(0);
        if gap == 0 {
            return;
        }
        let zeros = gap.min(u64::try_from(self.span()).unwrap_or(u64::MAX));
        for _ in 0..zeros {
            for series in &mut self.series {
                series.windows.iter_mut().for_each(|w| w.add(0.0));
            }
        }
        self.stats.bins += gap;
        metrics::counter!(m::EDGE_DETECT_BINS_TOTAL).increment(gap);
        tracing::trace!(from, to, gap, zeros, "filled empty bins with zeros");
    }

    fn analyze(&mut self, time: i64, out: &mut Vec<EdgeEvent>) {
        let timestamp = time - self.event_offset;
        let before = out.len();
        for series in &self.series {
            let mut fired = false;
            let columns: Vec<ColumnReading> = self
                .rules
                .iter()
                .zip(&series.windows)
                .map(|(rule, window)| {
                    let (reading, hit) = rule.read(window, self.min_interesting);
                    fired |= hit;
                    reading
                })
                .collect();
            if fired {
                out.push(EdgeEvent {
                    timestamp,
                    key: series.key.clone(),
                    columns,
                });
            }
        }

        let events = (out.len() - before) as u64;
        if events > 0 {
            self.stats.events += events;
            metrics::counter!(m::EDGE_DETECT_EVENTS_TOTAL).increment(events);
            tracing::debug!(time, timestamp, events, "edges detected");
        }
    }
}

impl Stage for EdgeDetector {
    type Input = Row;
    type Output = EdgeEvent;

    fn name(&self) -> &'static str {
        STAGE
    }

    fn push(&mut self, row: Row, out: &mut Vec<EdgeEvent>) -> Result<(), TimebinError> {
        self.stats.rows += 1;
        let Some(time) = row.number(self.time_column) else {
            self.stats.skipped += 1;
            tracing::trace!(column = self.time_column, "row without numeric time skipped");
            return Ok(());
        };
        let key = row.text(self.key_column);
        let values: Vec<Option<f64>> = self.rules.iter().map(|r| row.number(r.position)).collect();
        self.observe(&key, time, &values, out)?;
        Ok(())
    }

    /// 마지막 구간을 넣고 다음 구간 시각에서 한 번 더 검사합니다.
    fn finish(&mut self, out: &mut Vec<EdgeEvent>) -> Result<(), TimebinError> {
        let Some(current) = self.current_bin.take() else {
            return Ok(());
        };
        self.commit();
        let time = current.saturating_add(i64::from(self.bin_size));
        if time >= self.first_analysis {
            self.analyze(time, out);
        }
        tracing::debug!(
            rows = self.stats.rows,
            series = self.series.len(),
            events = self.stats.events,
            "edge detector finished"
        );
        Ok(())
    }

    fn discard(&mut self) -> usize {
        let pending = self.series.iter().filter(|s| s.pending.is_some()).count();
        self.series.clear();
        self.positions.clear();
        self.current_bin = None;
        pending
    }
}
