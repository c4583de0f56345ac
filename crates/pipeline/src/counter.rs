//! Feature Counter -- 원시 행을 시간 구간별 `(index, key, subkey, value)` 튜플로 집계
//!
//! 행마다 다음 순서로 처리합니다.
//!
//! 1. 필터를 순서대로 적용합니다. 하나라도 `false`면 행을 버립니다.
//! 2. 시간 컬럼을 구간 시작값으로 내림합니다. 시간이 없거나 숫자가 아니면 건너뜁니다.
//! 3. 인덱스마다 추출 함수 → 값 함수 → 결합 함수를 적용해 슬롯을 갱신합니다.
//!    키가 비어 있으면 그 인덱스만 건너뜁니다.
//!
//! 구간을 내보낼 때는 `(time_bin, 인덱스 설정 순서, key, subkey)` 순으로 정렬합니다.

use std::collections::HashMap;

use timebin_core::error::TimebinError;
use timebin_core::metrics as m;
use timebin_core::pipeline::Stage;
use timebin_core::spec::{FeatureCounterSpec, resolve_args};
use timebin_core::types::{Row, Schema, Tuple, time_bin};

use crate::config::{CounterConfig, ReleaseMode};
use crate::error::AnalysisError;
use crate::registry::{CombineFn, Coordinate, Extractor, FunctionRegistry, RowFilter, ValueFn};

const STAGE: &str = "feature_counter";

/// 값 함수 기본값
pub const DEFAULT_VALUE_FN: &str = "one";
/// 결합 함수 기본값
pub const DEFAULT_COMBINE_FN: &str = "sum";

/// 인덱스 하나의 함수 묶음
struct IndexFunctions {
    name: String,
    extractor: Box<dyn Extractor>,
    value: Box<dyn ValueFn>,
    combine: Box<dyn CombineFn>,
}

/// `(time_bin, 인덱스 위치, key, subkey)`
type SlotKey = (i64, usize, String, String);

/// Feature Counter 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterStats {
    /// 읽은 행 수
    pub rows: u64,
    /// 필터로 제외된 행 수
    pub filtered: u64,
    /// 시간 값 문제로 건너뛴 행 수
    pub skipped: u64,
    /// 방출한 튜플 수
    pub tuples_out: u64,
    /// 방출한 구간 수 (bulk 모드는 플러시 횟수)
    pub flushes: u64,
}

/// 특성 집계 스테이지
pub struct FeatureCounter {
    config: CounterConfig,
    time_column: usize,
    filters: Vec<(String, Box<dyn RowFilter>)>,
    indices: Vec<IndexFunctions>,
    slots: HashMap<SlotKey, f64>,
    current_bin: Option<i64>,
    stats: CounterStats,
}

impl FeatureCounter {
    /// 명세 섹션의 함수를 입력 스키마에 대해 해석하고 구성합니다.
    ///
    /// 알 수 없는 함수, 잘못된 인자, 없는 컬럼은 모두 여기서 실패합니다.
    pub fn new(
        config: CounterConfig,
        spec: &FeatureCounterSpec,
        schema: &Schema,
        registry: &FunctionRegistry,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        if spec.outputs.is_empty() {
            return Err(AnalysisError::invalid_args(
                "featureCounter.outputs",
                "must define at least one output",
            ));
        }
        let time_column = config.time_column.resolve_column(schema)?;

        let mut filters = Vec::with_capacity(spec.filters.len());
        for filter in &spec.filters {
            let args = resolve_args(&filter.arguments, schema)?;
            filters.push((filter.function.clone(), registry.filter(&filter.function, &args)?));
        }

        let mut indices = Vec::with_capacity(spec.outputs.len());
        for (name, output) in &spec.outputs {
            let value_name = output.value.as_deref().unwrap_or(DEFAULT_VALUE_FN);
            let combine_name = output.combine.as_deref().unwrap_or(DEFAULT_COMBINE_FN);
            indices.push(IndexFunctions {
                name: name.clone(),
                extractor: registry
                    .extractor(&output.function, &resolve_args(&output.arguments, schema)?)?,
                value: registry.value(value_name, &resolve_args(&output.value_arguments, schema)?)?,
                combine: registry
                    .combine(combine_name, &resolve_args(&output.combine_arguments, schema)?)?,
            });
            tracing::debug!(
                index = %name,
                extractor = %output.function,
                value = value_name,
                combine = combine_name,
                "feature counter index configured"
            );
        }

        tracing::info!(
            indices = indices.len(),
            filters = filters.len(),
            time_column,
            bin_size = config.bin_size,
            mode = ?config.mode,
            "feature counter ready"
        );

        Ok(Self {
            config,
            time_column,
            filters,
            indices,
            slots: HashMap::new(),
            current_bin: None,
            stats: CounterStats::default(),
        })
    }

    /// 인덱스 이름 (설정 순서)
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indices.iter().map(|i| i.name.as_str())
    }

    pub fn mode(&self) -> ReleaseMode {
        self.config.mode
    }

    pub fn stats(&self) -> CounterStats {
        self.stats
    }

    /// 행이 모든 필터를 통과하는지 검사합니다.
    fn passes_filters(&mut self, row: &Row) -> bool {
        for (name, filter) in &mut self.filters {
            if !filter.keep(row) {
                tracing::trace!(filter = %name, "row filtered");
                return false;
            }
        }
        true
    }

    fn flush(&mut self, out: &mut Vec<Tuple>) {
        if self.slots.is_empty() {
            return;
        }
        let mut slots: Vec<_> = self.slots.drain().collect();
        slots.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let emitted = slots.len();
        out.extend(slots.into_iter().map(|((bin, pos, key, subkey), value)| Tuple {
            time_bin: bin,
            index: self.indices[pos].name.clone(),
            key,
            subkey,
            value,
        }));

        self.stats.tuples_out += emitted as u64;
        self.stats.flushes += 1;
        metrics::counter!(m::COUNTER_TUPLES_TOTAL).increment(emitted as u64);
        metrics::counter!(m::STAGE_BINS_FLUSHED_TOTAL, m::LABEL_STAGE => STAGE).increment(1);
        tracing::debug!(tuples = emitted, "flushed feature counts");
    }
}

impl Stage for FeatureCounter {
    type Input = Row;
    type Output = Tuple;

    fn name(&self) -> &'static str {
        STAGE
    }

    fn push(&mut self, row: Row, out: &mut Vec<Tuple>) -> Result<(), TimebinError> {
        self.stats.rows += 1;
        metrics::counter!(m::COUNTER_ROWS_TOTAL).increment(1);

        if !self.passes_filters(&row) {
            self.stats.filtered += 1;
            metrics::counter!(m::COUNTER_ROWS_FILTERED_TOTAL).increment(1);
            return Ok(());
        }

        let bin_size = self.config.bin_size;
        let Some(bin) = row
            .number(self.time_column)
            .and_then(|t| time_bin(t, bin_size))
        else {
            self.stats.skipped += 1;
            metrics::counter!(m::COUNTER_ROWS_SKIPPED_TOTAL).increment(1);
            tracing::debug!(
                column = self.time_column,
                value = %row.text(self.time_column),
                "skipping row without finite numeric time"
            );
            return Ok(());
        };

        if self.config.mode == ReleaseMode::Incremental
            && let Some(previous) = self.current_bin
            && previous != bin
        {
            if bin < previous {
                tracing::warn!(previous, current = bin, "time went backwards, incremental output will be unordered");
            }
            self.flush(out);
        }
        self.current_bin = Some(bin);

        for (pos, index) in self.indices.iter_mut().enumerate() {
            let (key, subkey) = match index.extractor.extract(&row) {
                Some((key, subkey)) if !key.is_empty() => (key, subkey),
                _ => continue,
            };
            let value = index.value.value(&row);
            let slot = (bin, pos, key, subkey);
            let previous = self.slots.get(&slot).copied();
            let at = Coordinate {
                time_bin: bin,
                index: &index.name,
                key: &slot.2,
                subkey: &slot.3,
            };
            let combined = index.combine.combine(at, previous, value);
            self.slots.insert(slot, combined);
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Tuple>) -> Result<(), TimebinError> {
        self.flush(out);
        self.current_bin = None;
        tracing::info!(
            rows = self.stats.rows,
            filtered = self.stats.filtered,
            skipped = self.stats.skipped,
            tuples = self.stats.tuples_out,
            "feature counter finished"
        );
        Ok(())
    }

    fn discard(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        self.current_bin = None;
        dropped
    }
}
