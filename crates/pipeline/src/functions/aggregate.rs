//! 집계 전략
//!
//! 모든 전략은 같은 입력 튜플을 보고 공유 [`BinResults`]의 자기 인덱스를
//! 갱신합니다. 결과 구조는 시간 구간마다 비워지므로, 별도 상태를 갖지 않는
//! 전략의 값은 모두 구간 단위입니다.
//!
//! | 이름 | 인자 | 동작 |
//! |------|------|------|
//! | `sum` | - | `(index, key, subkey)` 합계 |
//! | `sumAndCountUnique` | `[label]` | 합계 + key별 서로 다른 subkey 수 (`<index>_unique`) |
//! | `unique` | `[target, output]` | target 인덱스의 key별 서로 다른 subkey 수. `scope`로 범위 선택 |
//! | `stringSplitter` | `[label]` | key를 공백으로 나눈 단어별 빈도 (`<index>_split`) |
//! | `value_max` | `[label]` | `(index, key, subkey)` 최댓값 (`<index>_max`) |

use std::borrow::Cow;
use std::collections::HashSet;

use timebin_core::spec::{Arg, UniqueScope};
use timebin_core::types::Tuple;

use super::{optional_text, require_args, text_arg};
use crate::aggregator::BinResults;
use crate::error::AnalysisError;
use crate::registry::{AggregationStrategy, FunctionRegistry};

/// `sumAndCountUnique`가 쓰는 보조 키
pub const UNIQUE_SUBKEY: &str = "unique";

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_aggregation("sum", |_, _| Ok(Box::new(Summer)))
        .register_aggregation("summer", |_, _| Ok(Box::new(Summer)))
        .register_aggregation("sumAndCountUnique", |args, _| {
            Ok(Box::new(SumAndCountUnique::new(args)))
        })
        .register_aggregation("unique", |args, scope| Ok(Box::new(Unique::new(args, scope)?)))
        .register_aggregation("stringSplitter", |args, _| {
            Ok(Box::new(StringSplitter::new(args)))
        })
        .register_aggregation("value_max", |args, _| Ok(Box::new(ValueMax::new(args))));
}

/// 라벨 인자가 없으면 `<index><suffix>`를 씁니다.
fn label_or<'a>(label: &'a Option<String>, index: &str, suffix: &str) -> Cow<'a, str> {
    match label {
        Some(label) => Cow::Borrowed(label.as_str()),
        None => Cow::Owned(format!("{index}{suffix}")),
    }
}

/// 구간 내 합계
pub struct Summer;

impl AggregationStrategy for Summer {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults) {
        results.add(&tuple.index, &tuple.key, &tuple.subkey, tuple.value);
    }
}

/// 합계와 함께 key별 서로 다른 subkey 수를 셉니다.
///
/// 결과 구조가 구간마다 비워지므로 고유 개수도 구간 단위입니다.
pub struct SumAndCountUnique {
    label: Option<String>,
}

impl SumAndCountUnique {
    pub fn new(args: &[Arg]) -> Self {
        Self {
            label: optional_text(args, 0),
        }
    }
}

impl AggregationStrategy for SumAndCountUnique {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults) {
        if results.add(&tuple.index, &tuple.key, &tuple.subkey, tuple.value) {
            let label = label_or(&self.label, &tuple.index, "_unique");
            results.add(&label, &tuple.key, UNIQUE_SUBKEY, 1.0);
        }
    }
}

/// 특정 인덱스의 key별 서로 다른 subkey 수
///
/// 본 `(key, subkey)` 집합은 전략 인스턴스가 가지며, [`UniqueScope::Stream`]이면
/// 스트림 전체에서 유지되고 [`UniqueScope::Bin`]이면 구간마다 비워집니다.
/// 출력 슬롯은 `(output, key, output)`입니다.
pub struct Unique {
    target: String,
    output: String,
    scope: UniqueScope,
    seen: HashSet<(String, String)>,
}

impl Unique {
    pub fn new(args: &[Arg], scope: UniqueScope) -> Result<Self, AnalysisError> {
        require_args("unique", args, 2)?;
        Ok(Self {
            target: text_arg("unique", args, 0)?,
            output: text_arg("unique", args, 1)?,
            scope,
            seen: HashSet::new(),
        })
    }
}

impl AggregationStrategy for Unique {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults) {
        if tuple.index != self.target {
            return;
        }
        results.upsert(&self.output, &tuple.key, &self.output, |prev| prev.unwrap_or(0.0));
        if self
            .seen
            .insert((tuple.key.clone(), tuple.subkey.clone()))
        {
            results.add(&self.output, &tuple.key, &self.output, 1.0);
        }
    }

    fn end_bin(&mut self) {
        if self.scope == UniqueScope::Bin {
            self.seen.clear();
        }
    }
}

/// key를 공백으로 나눈 단어별 빈도
pub struct StringSplitter {
    label: Option<String>,
}

impl StringSplitter {
    pub fn new(args: &[Arg]) -> Self {
        Self {
            label: optional_text(args, 0),
        }
    }
}

impl AggregationStrategy for StringSplitter {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults) {
        let label = label_or(&self.label, &tuple.index, "_split");
        for word in tuple.key.split_whitespace() {
            results.add(&label, word, "", 1.0);
        }
    }
}

/// 구간 내 최댓값
pub struct ValueMax {
    label: Option<String>,
}

impl ValueMax {
    pub fn new(args: &[Arg]) -> Self {
        Self {
            label: optional_text(args, 0),
        }
    }
}

impl AggregationStrategy for ValueMax {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults) {
        let label = label_or(&self.label, &tuple.index, "_max");
        let value = tuple.value;
        results.upsert(&label, &tuple.key, &tuple.subkey, |prev| {
            prev.map_or(value, |m| m.max(value))
        });
    }
}
