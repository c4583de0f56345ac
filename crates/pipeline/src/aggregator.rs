//! Aggregator -- 시간순 튜플 스트림의 구간별 재집계
//!
//! [`Aggregator`]는 Feature Counter 출력처럼 시간 구간별로 정렬된 튜플을 받아,
//! 설정된 집계 전략을 순서대로 모두 적용합니다. 전략은 공유 [`BinResults`]에
//! 값을 쌓고, 시간 구간이 바뀌면 결과를 정렬해 내보낸 뒤 비웁니다.
//!
//! # 순서 규칙
//! 이전보다 작은 시간 구간이 들어오면 [`AnalysisError::TimeWentBackwards`]로
//! 즉시 실패합니다. 입력을 다시 정렬한 뒤 처음부터 실행해야 합니다.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use timebin_core::error::TimebinError;
use timebin_core::metrics as m;
use timebin_core::pipeline::Stage;
use timebin_core::spec::{AggregatorSpec, resolve_args};
use timebin_core::types::{Schema, Tuple};

use crate::error::AnalysisError;
use crate::registry::{AggregationStrategy, FunctionRegistry};

const STAGE: &str = "aggregator";

/// 한 시간 구간의 집계 결과. `(index, key, subkey) → value`
#[derive(Debug, Clone, Default)]
pub struct BinResults {
    slots: HashMap<(String, String, String), f64>,
}

impl BinResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// 값을 더합니다. 새 슬롯이 만들어졌으면 `true`를 반환합니다.
    pub fn add(&mut self, index: &str, key: &str, subkey: &str, value: f64) -> bool {
        self.upsert(index, key, subkey, |prev| prev.unwrap_or(0.0) + value)
    }

    /// 기존 값(없으면 `None`)으로 새 값을 계산해 저장합니다.
    /// 새 슬롯이 만들어졌으면 `true`를 반환합니다.
    pub fn upsert<F>(&mut self, index: &str, key: &str, subkey: &str, update: F) -> bool
    where
        F: FnOnce(Option<f64>) -> f64,
    {
        match self
            .slots
            .entry((index.to_owned(), key.to_owned(), subkey.to_owned()))
        {
            Entry::Occupied(mut slot) => {
                let next = update(Some(*slot.get()));
                slot.insert(next);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(update(None));
                true
            }
        }
    }

    pub fn get(&self, index: &str, key: &str, subkey: &str) -> Option<f64> {
        self.slots
            .get(&(index.to_owned(), key.to_owned(), subkey.to_owned()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// 모든 슬롯을 `(index, key, subkey)` 순으로 정렬해 튜플로 꺼냅니다.
    pub fn drain_sorted(&mut self, time_bin: i64) -> Vec<Tuple> {
        let mut slots: Vec<_> = self.slots.drain().collect();
        slots.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        slots
            .into_iter()
            .map(|((index, key, subkey), value)| Tuple {
                time_bin,
                index,
                key,
                subkey,
                value,
            })
            .collect()
    }
}

/// Aggregator 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub tuples_in: u64,
    pub tuples_out: u64,
    pub bins_flushed: u64,
}

/// 구간별 재집계 스테이지
pub struct Aggregator {
    strategies: Vec<(String, Box<dyn AggregationStrategy>)>,
    results: BinResults,
    current_bin: Option<i64>,
    stats: AggregatorStats,
}

impl Aggregator {
    /// 이름이 붙은 전략 목록으로 생성합니다. 전략은 주어진 순서대로 적용됩니다.
    pub fn new(strategies: Vec<(String, Box<dyn AggregationStrategy>)>) -> Self {
        Self {
            strategies,
            results: BinResults::new(),
            current_bin: None,
            stats: AggregatorStats::default(),
        }
    }

    /// 합계 전략 하나만 쓰는 Aggregator
    pub fn summing() -> Self {
        Self::new(vec![(
            "sum".to_owned(),
            Box::new(crate::functions::aggregate::Summer),
        )])
    }

    /// `aggregator` 명세 섹션에서 전략을 구성합니다.
    ///
    /// 인자는 컬럼이 아닌 인덱스 이름이므로 빈 스키마로 해석합니다.
    pub fn from_spec(
        spec: &AggregatorSpec,
        registry: &FunctionRegistry,
    ) -> Result<Self, AnalysisError> {
        if spec.aggregators.is_empty() {
            return Err(AnalysisError::invalid_args(
                "aggregator.aggregators",
                "must list at least one strategy",
            ));
        }
        let schema = Schema::default();
        let mut strategies = Vec::with_capacity(spec.aggregators.len());
        for entry in &spec.aggregators {
            let def = entry.to_def();
            let args = resolve_args(&def.arguments, &schema)?;
            let strategy =
                registry.aggregation(&def.function, &args, def.scope.unwrap_or_default())?;
            tracing::debug!(function = %def.function, args = args.len(), "aggregation strategy configured");
            strategies.push((def.function, strategy));
        }
        Ok(Self::new(strategies))
    }

    /// 설정된 전략 이름 (적용 순서)
    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|(name, _)| name.as_str())
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    fn flush(&mut self, time_bin: i64, out: &mut Vec<Tuple>) {
        let tuples = self.results.drain_sorted(time_bin);
        let emitted = tuples.len();
        out.extend(tuples);
        for (_, strategy) in &mut self.strategies {
            strategy.end_bin();
        }

        self.stats.tuples_out += emitted as u64;
        self.stats.bins_flushed += 1;
        metrics::counter!(m::AGGREGATOR_TUPLES_OUT_TOTAL).increment(emitted as u64);
        metrics::counter!(m::STAGE_BINS_FLUSHED_TOTAL, m::LABEL_STAGE => STAGE).increment(1);
        tracing::debug!(time_bin, tuples = emitted, "flushed bin");
    }
}

impl Stage for Aggregator {
    type Input = Tuple;
    type Output = Tuple;

    fn name(&self) -> &'static str {
        STAGE
    }

    fn push(&mut self, tuple: Tuple, out: &mut Vec<Tuple>) -> Result<(), TimebinError> {
        if let Some(previous) = self.current_bin {
            if tuple.time_bin < previous {
                return Err(AnalysisError::TimeWentBackwards {
                    stage: STAGE.to_owned(),
                    previous,
                    current: tuple.time_bin,
                    index: tuple.index,
                    key: tuple.key,
                }
                .into());
            }
            if tuple.time_bin > previous {
                self.flush(previous, out);
            }
        }
        self.current_bin = Some(tuple.time_bin);

        self.stats.tuples_in += 1;
        metrics::counter!(m::AGGREGATOR_TUPLES_IN_TOTAL).increment(1);
        for (_, strategy) in &mut self.strategies {
            strategy.apply(&tuple, &mut self.results);
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Tuple>) -> Result<(), TimebinError> {
        if let Some(time_bin) = self.current_bin.take() {
            self.flush(time_bin, out);
        }
        Ok(())
    }

    fn discard(&mut self) -> usize {
        let dropped = self.results.len();
        self.results.clear();
        self.current_bin = None;
        dropped
    }
}
