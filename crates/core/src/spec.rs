//! 분석 명세 -- YAML 문서 모델과 인자 지정자 해석
//!
//! 하나의 YAML 문서가 모든 스테이지의 섹션을 담을 수 있습니다.
//! 각 스테이지는 자기 섹션만 읽고, 섹션이 없으면
//! [`ConfigError::MissingSection`]으로 구성 단계에서 실패합니다.
//!
//! ```yaml
//! timeColumn: time
//! binSize: 60
//! featureCounter:
//!   filters:
//!     - function: exclude_exprs
//!       arguments: [col(qname), '\.local$']
//!   outputs:
//!     domain_count:
//!       function: PSL_domain
//!       arguments: [col(qname)]
//! aggregator:
//!   aggregators: [sum, "sumAndCountUnique:uniques"]
//! relationshipAnalysis:
//!   outputs:
//!     ratio:
//!       function: fraction
//!       arguments: [data1, data2]
//! edgeDetect:
//!   keyColumn: key
//!   windowSize: 5
//!   analyzeColumns: [count]
//! ```
//!
//! # 인자 지정자
//!
//! 함수 인자는 입력 스키마에 대해 한 번만 해석됩니다 ([`ArgSpec::resolve`]).
//!
//! | 형식 | 결과 |
//! |------|------|
//! | `col(NAME)`, `column(NAME)` | 컬럼 위치. 없으면 설정 에러 |
//! | `int(N)`, `float(X)` | 숫자 리터럴 |
//! | `str(S)`, `string(S)` | 문자열 리터럴 |
//! | YAML 정수 / 정수 문자열 | 정수 (컬럼 위치로도 사용 가능) |
//! | 스키마 컬럼 이름과 같은 문자열 | 해당 컬럼 위치 |
//! | 그 외 문자열 | 문자열 리터럴 |

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TimebinError};
use crate::types::Schema;

/// YAML에 적힌 그대로의 함수 인자
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ArgSpec {
    /// 스키마에 대해 인자를 해석합니다.
    pub fn resolve(&self, schema: &Schema) -> Result<Arg, ConfigError> {
        match self {
            Self::Int(n) => Ok(Arg::Int(*n)),
            Self::Float(x) => Ok(Arg::Float(*x)),
            Self::Text(s) => resolve_text(s, schema),
        }
    }

    /// 반드시 컬럼을 가리켜야 하는 인자를 해석합니다 (시간 컬럼, 키 컬럼 등).
    pub fn resolve_column(&self, schema: &Schema) -> Result<usize, ConfigError> {
        match self.resolve(schema)? {
            Arg::Column(pos) => Ok(pos),
            Arg::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(ConfigError::UnresolvedColumn {
                name: other.text().into_owned(),
            }),
        }
    }
}

impl From<&str> for ArgSpec {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for ArgSpec {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// 인자 목록 전체를 해석합니다.
pub fn resolve_args(args: &[ArgSpec], schema: &Schema) -> Result<Vec<Arg>, ConfigError> {
    args.iter().map(|a| a.resolve(schema)).collect()
}

fn resolve_text(s: &str, schema: &Schema) -> Result<Arg, ConfigError> {
    if let Some(name) = call_argument(s, &["column", "col"]) {
        return schema
            .position(name)
            .map(Arg::Column)
            .ok_or_else(|| ConfigError::UnresolvedColumn {
                name: name.to_owned(),
            });
    }
    if let Some(inner) = call_argument(s, &["int"]) {
        return inner
            .trim()
            .parse::<i64>()
            .map(Arg::Int)
            .map_err(|_| ConfigError::InvalidValue {
                field: s.to_owned(),
                reason: "not an integer".to_owned(),
            });
    }
    if let Some(inner) = call_argument(s, &["float"]) {
        return inner
            .trim()
            .parse::<f64>()
            .map(Arg::Float)
            .map_err(|_| ConfigError::InvalidValue {
                field: s.to_owned(),
                reason: "not a number".to_owned(),
            });
    }
    if let Some(inner) = call_argument(s, &["string", "str"]) {
        return Ok(Arg::Text(inner.to_owned()));
    }
    if let Ok(n) = s.parse::<i64>() {
        return Ok(Arg::Int(n));
    }
    if let Some(pos) = schema.position(s) {
        return Ok(Arg::Column(pos));
    }
    Ok(Arg::Text(s.to_owned()))
}

/// `name(inner)` 형식이면 `inner`를 돌려줍니다.
fn call_argument<'a>(s: &'a str, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        s.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
    })
}

/// 해석된 함수 인자
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// 입력 행의 컬럼 위치
    Column(usize),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Arg {
    /// 컬럼 위치로 사용합니다. 음이 아닌 정수도 위치로 취급합니다.
    pub fn column(&self) -> Option<usize> {
        match self {
            Self::Column(pos) => Some(*pos),
            Self::Int(n) if *n >= 0 => Some(*n as usize),
            _ => None,
        }
    }

    /// 문자열로 사용합니다 (인덱스 이름, 키, 정규식 등).
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Float(x) => Cow::Owned(x.to_string()),
            Self::Column(pos) => Cow::Owned(pos.to_string()),
        }
    }

    /// 숫자로 사용합니다.
    pub fn number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Column(_) => None,
        }
    }
}

/// 분석 명세 문서 전체
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSpec {
    /// 시간 컬럼 (이름, `col(name)` 또는 위치)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<ArgSpec>,
    /// 시간 구간 크기 (초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_counter: Option<FeatureCounterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<AggregatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_analysis: Option<RelationshipSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_detect: Option<EdgeDetectSpec>,
}

impl AnalysisSpec {
    /// YAML 문자열에서 명세를 파싱합니다. 빈 문서는 빈 명세입니다.
    pub fn parse(yaml: &str) -> Result<Self, TimebinError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let spec: Self = serde_yaml::from_str(yaml).map_err(|e| {
            TimebinError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// YAML 파일에서 명세를 로드합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TimebinError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TimebinError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TimebinError::Io(e)
            }
        })?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "loaded analysis specification");
        Self::parse(&content)
    }

    /// 구조적으로 파싱된 명세의 값 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), TimebinError> {
        if self.bin_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "binSize".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }
        if let Some(fc) = &self.feature_counter
            && fc.outputs.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "featureCounter.outputs".to_owned(),
                reason: "must define at least one output".to_owned(),
            }
            .into());
        }
        if let Some(edge) = &self.edge_detect
            && edge.window_size == Some(0)
        {
            return Err(ConfigError::InvalidValue {
                field: "edgeDetect.windowSize".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }
        Ok(())
    }

    pub fn feature_counter(&self) -> Result<&FeatureCounterSpec, ConfigError> {
        self.feature_counter
            .as_ref()
            .ok_or_else(|| missing("featureCounter"))
    }

    pub fn aggregator(&self) -> Result<&AggregatorSpec, ConfigError> {
        self.aggregator.as_ref().ok_or_else(|| missing("aggregator"))
    }

    pub fn relationship_analysis(&self) -> Result<&RelationshipSpec, ConfigError> {
        self.relationship_analysis
            .as_ref()
            .ok_or_else(|| missing("relationshipAnalysis"))
    }

    pub fn edge_detect(&self) -> Result<&EdgeDetectSpec, ConfigError> {
        self.edge_detect.as_ref().ok_or_else(|| missing("edgeDetect"))
    }
}

fn missing(section: &str) -> ConfigError {
    ConfigError::MissingSection {
        section: section.to_owned(),
    }
}

/// 이름과 인자로 된 함수 지정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<ArgSpec>,
}

impl FunctionSpec {
    pub fn new(function: impl Into<String>, arguments: Vec<ArgSpec>) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }
}

/// `featureCounter` 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCounterSpec {
    /// 순서대로 적용되는 행 필터
    #[serde(default)]
    pub filters: Vec<FunctionSpec>,
    /// 인덱스 이름 → 출력 정의 (문서 순서 유지)
    #[serde(with = "ordered")]
    pub outputs: Vec<(String, OutputSpec)>,
}

/// Feature Counter 인덱스 하나의 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// 키 추출 함수
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<ArgSpec>,
    /// 값 함수 (기본: `one`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub value_arguments: Vec<ArgSpec>,
    /// 결합 함수 (기본: `sum`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<String>,
    #[serde(default)]
    pub combine_arguments: Vec<ArgSpec>,
}

impl OutputSpec {
    pub fn new(function: impl Into<String>, arguments: Vec<ArgSpec>) -> Self {
        Self {
            function: function.into(),
            arguments,
            value: None,
            value_arguments: Vec::new(),
            combine: None,
            combine_arguments: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>, arguments: Vec<ArgSpec>) -> Self {
        self.value = Some(value.into());
        self.value_arguments = arguments;
        self
    }

    pub fn with_combine(mut self, combine: impl Into<String>, arguments: Vec<ArgSpec>) -> Self {
        self.combine = Some(combine.into());
        self.combine_arguments = arguments;
        self
    }
}

/// `aggregator` 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorSpec {
    pub aggregators: Vec<AggregatorEntry>,
}

/// 집계 전략 하나
///
/// `"name"`, `"name:arg1,arg2"` 문자열 또는 매핑 형식을 받습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatorEntry {
    Short(String),
    Full(AggregatorDef),
}

impl AggregatorEntry {
    /// 매핑 형식으로 정규화합니다.
    pub fn to_def(&self) -> AggregatorDef {
        match self {
            Self::Full(def) => def.clone(),
            Self::Short(text) => {
                let (function, args) = match text.split_once(':') {
                    Some((name, args)) => (name, args),
                    None => (text.as_str(), ""),
                };
                let arguments = args
                    .split(',')
                    .filter(|a| !a.is_empty())
                    .map(ArgSpec::from)
                    .collect();
                AggregatorDef {
                    function: function.to_owned(),
                    arguments,
                    scope: None,
                }
            }
        }
    }
}

/// 매핑 형식의 집계 전략
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorDef {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<ArgSpec>,
    /// `unique` 전략의 중복 판정 범위
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<UniqueScope>,
}

/// `unique` 전략이 본 보조 키를 기억하는 범위
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniqueScope {
    /// 스트림 전체에서 한 번만 센다
    #[default]
    Stream,
    /// 시간 구간마다 새로 센다
    Bin,
}

/// `relationshipAnalysis` 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSpec {
    /// 출력 컬럼 이름 → 관계 함수 (문서 순서 유지)
    #[serde(with = "ordered")]
    pub outputs: Vec<(String, FunctionSpec)>,
}

/// `edgeDetect` 섹션
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDetectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<ArgSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_jump: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interesting: Option<f64>,
    #[serde(default)]
    pub analyze_columns: Vec<ColumnSpec>,
}

/// 분석 대상 컬럼. 이름만 쓰거나 임계값을 함께 지정합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Name(String),
    Detailed(ColumnThresholds),
}

impl ColumnSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed(t) => &t.name,
        }
    }

    /// 컬럼별 임계값. 지정하지 않은 항목은 `None`입니다.
    pub fn thresholds(&self) -> ColumnThresholds {
        match self {
            Self::Name(name) => ColumnThresholds {
                name: name.clone(),
                ..ColumnThresholds::default()
            },
            Self::Detailed(t) => t.clone(),
        }
    }
}

/// 컬럼별 임계값 오버라이드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnThresholds {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_jump: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
}

/// YAML 매핑을 문서 순서를 유지한 `(이름, 값)` 목록으로 (역)직렬화합니다.
mod ordered {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(entries: &Vec<(String, T)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, value) in entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }

    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of output names to definitions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries: Vec<(String, T)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, value)) = map.next_entry::<String, T>()? {
                if entries.iter().any(|(existing, _)| *existing == name) {
                    return Err(A::Error::custom(format!("duplicate output '{name}'")));
                }
                entries.push((name, value));
            }
            Ok(entries)
        }
    }
}
