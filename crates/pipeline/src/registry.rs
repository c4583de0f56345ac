//! 함수 레지스트리 -- 이름 → 함수 팩토리
//!
//! 설정 파일은 함수를 이름으로만 가리킵니다. [`FunctionRegistry`]는 이름을
//! 팩토리에 매핑하고, 팩토리는 해석된 인자([`Arg`])로 상태를 가진 함수 객체를
//! 만듭니다. 정규식 컴파일, 인자 개수 검사 같은 준비 작업은 모두 이때 끝나므로
//! 잘못된 설정은 행을 처리하기 전에 드러납니다.
//!
//! 이름 조회는 정확한 이름을 먼저 찾고, 없으면 마지막 `.` 뒤 부분으로 다시
//! 찾습니다 (`gawseed.algorithm.generic.identity` → `identity`).
//!
//! # 사용 예시
//! ```ignore
//! let mut registry = FunctionRegistry::with_defaults();
//! registry.register_value("double", |_args| Ok(Box::new(Constant(2.0))));
//! let value_fn = registry.value("double", &[])?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use timebin_core::spec::{Arg, UniqueScope};
use timebin_core::types::{Row, Tuple};

use crate::aggregator::BinResults;
use crate::bundle::{Bundle, SlotValues};
use crate::error::AnalysisError;
use crate::functions;
use crate::functions::dns::{DomainClassifier, SuffixList};

/// 행에서 `(key, subkey)`를 뽑는 함수
///
/// `None` 또는 빈 키를 반환하면 해당 인덱스에서 이 행을 건너뜁니다.
pub trait Extractor: Send {
    fn extract(&mut self, row: &Row) -> Option<(String, String)>;
}

/// 행에서 값을 계산하는 함수
///
/// 해석할 수 없는 입력에는 0을 반환합니다 (스트림을 중단하지 않음).
pub trait ValueFn: Send {
    fn value(&mut self, row: &Row) -> f64;
}

/// 결합 함수가 보는 슬롯 좌표
#[derive(Debug, Clone, Copy)]
pub struct Coordinate<'a> {
    pub time_bin: i64,
    pub index: &'a str,
    pub key: &'a str,
    pub subkey: &'a str,
}

/// 기존 슬롯 값과 새 값을 합치는 함수
pub trait CombineFn: Send {
    fn combine(&mut self, at: Coordinate<'_>, previous: Option<f64>, incoming: f64) -> f64;
}

/// 행 필터. `false`면 행 전체를 버립니다.
pub trait RowFilter: Send {
    fn keep(&mut self, row: &Row) -> bool;
}

/// 번들 안의 다른 값을 참조해 파생 값을 계산하는 함수
///
/// 참조할 값이 없으면 `None`(no data)을 반환합니다.
pub trait RelationshipFn: Send {
    fn evaluate(
        &mut self,
        bundle: &Bundle,
        key: &str,
        subkey: &str,
        slot: &SlotValues,
    ) -> Option<f64>;
}

/// Aggregator의 집계 전략
///
/// 모든 전략이 같은 입력 튜플을 보고, 공유 결과 구조의 자기 영역을 갱신합니다.
pub trait AggregationStrategy: Send {
    fn apply(&mut self, tuple: &Tuple, results: &mut BinResults);

    /// 시간 구간이 플러시된 직후 호출됩니다.
    fn end_bin(&mut self) {}
}

/// 함수 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Extractor,
    Value,
    Combine,
    Filter,
    Relationship,
    Aggregation,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 6] = [
        Self::Extractor,
        Self::Value,
        Self::Combine,
        Self::Filter,
        Self::Relationship,
        Self::Aggregation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extractor => "extractor",
            Self::Value => "value",
            Self::Combine => "combine",
            Self::Filter => "filter",
            Self::Relationship => "relationship",
            Self::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Factory<T> = Box<dyn Fn(&[Arg]) -> Result<T, AnalysisError> + Send + Sync>;
type AggregationFactory =
    Box<dyn Fn(&[Arg], UniqueScope) -> Result<Box<dyn AggregationStrategy>, AnalysisError> + Send + Sync>;

/// 이름 → 팩토리 테이블
struct Table<F> {
    kind: FunctionKind,
    entries: HashMap<String, F>,
}

impl<F> Table<F> {
    fn new(kind: FunctionKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, name: &str, factory: F) {
        if self.entries.insert(name.to_owned(), factory).is_some() {
            tracing::debug!(kind = %self.kind, name, "function re-registered, replacing");
        }
    }

    fn get(&self, name: &str) -> Result<&F, AnalysisError> {
        self.entries
            .get(name)
            .or_else(|| {
                name.rsplit_once('.')
                    .and_then(|(_, short)| self.entries.get(short))
            })
            .ok_or_else(|| AnalysisError::UnknownFunction {
                kind: self.kind.to_string(),
                name: name.to_owned(),
            })
    }

    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// 함수 레지스트리
pub struct FunctionRegistry {
    extractors: Table<Factory<Box<dyn Extractor>>>,
    values: Table<Factory<Box<dyn ValueFn>>>,
    combiners: Table<Factory<Box<dyn CombineFn>>>,
    filters: Table<Factory<Box<dyn RowFilter>>>,
    relationships: Table<Factory<Box<dyn RelationshipFn>>>,
    aggregations: Table<AggregationFactory>,
}

impl FunctionRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            extractors: Table::new(FunctionKind::Extractor),
            values: Table::new(FunctionKind::Value),
            combiners: Table::new(FunctionKind::Combine),
            filters: Table::new(FunctionKind::Filter),
            relationships: Table::new(FunctionKind::Relationship),
            aggregations: Table::new(FunctionKind::Aggregation),
        }
    }

    /// 내장 함수와 내장 도메인 접미사 목록으로 레지스트리를 생성합니다.
    pub fn with_defaults() -> Self {
        Self::with_classifier(Arc::new(SuffixList::builtin()))
    }

    /// 내장 함수를 등록하되, DNS 함수는 주어진 분류기를 사용합니다.
    pub fn with_classifier(classifier: Arc<dyn DomainClassifier>) -> Self {
        let mut registry = Self::new();
        functions::register_builtins(&mut registry, classifier);
        registry
    }

    pub fn register_extractor<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg]) -> Result<Box<dyn Extractor>, AnalysisError> + Send + Sync + 'static,
    {
        self.extractors.insert(name, Box::new(factory));
        self
    }

    pub fn register_value<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg]) -> Result<Box<dyn ValueFn>, AnalysisError> + Send + Sync + 'static,
    {
        self.values.insert(name, Box::new(factory));
        self
    }

    pub fn register_combine<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg]) -> Result<Box<dyn CombineFn>, AnalysisError> + Send + Sync + 'static,
    {
        self.combiners.insert(name, Box::new(factory));
        self
    }

    pub fn register_filter<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg]) -> Result<Box<dyn RowFilter>, AnalysisError> + Send + Sync + 'static,
    {
        self.filters.insert(name, Box::new(factory));
        self
    }

    pub fn register_relationship<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg]) -> Result<Box<dyn RelationshipFn>, AnalysisError> + Send + Sync + 'static,
    {
        self.relationships.insert(name, Box::new(factory));
        self
    }

    pub fn register_aggregation<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&[Arg], UniqueScope) -> Result<Box<dyn AggregationStrategy>, AnalysisError>
            + Send
            + Sync
            + 'static,
    {
        self.aggregations.insert(name, Box::new(factory));
        self
    }

    pub fn extractor(&self, name: &str, args: &[Arg]) -> Result<Box<dyn Extractor>, AnalysisError> {
        (self.extractors.get(name)?)(args)
    }

    pub fn value(&self, name: &str, args: &[Arg]) -> Result<Box<dyn ValueFn>, AnalysisError> {
        (self.values.get(name)?)(args)
    }

    pub fn combine(&self, name: &str, args: &[Arg]) -> Result<Box<dyn CombineFn>, AnalysisError> {
        (self.combiners.get(name)?)(args)
    }

    pub fn filter(&self, name: &str, args: &[Arg]) -> Result<Box<dyn RowFilter>, AnalysisError> {
        (self.filters.get(name)?)(args)
    }

    pub fn relationship(
        &self,
        name: &str,
        args: &[Arg],
    ) -> Result<Box<dyn RelationshipFn>, AnalysisError> {
        (self.relationships.get(name)?)(args)
    }

    pub fn aggregation(
        &self,
        name: &str,
        args: &[Arg],
        scope: UniqueScope,
    ) -> Result<Box<dyn AggregationStrategy>, AnalysisError> {
        (self.aggregations.get(name)?)(args, scope)
    }

    /// 종류별로 등록된 이름 목록 (정렬됨)
    pub fn names(&self, kind: FunctionKind) -> Vec<&str> {
        match kind {
            FunctionKind::Extractor => self.extractors.names(),
            FunctionKind::Value => self.values.names(),
            FunctionKind::Combine => self.combiners.names(),
            FunctionKind::Filter => self.filters.names(),
            FunctionKind::Relationship => self.relationships.names(),
            FunctionKind::Aggregation => self.aggregations.names(),
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
