//! Relationship Analyzer -- 번들 단위 파생 값 계산
//!
//! 같은 시간 구간의 튜플을 [`Bundle`]로 모은 뒤, 구간이 바뀌면 번들 안의
//! `(key, subkey)` 슬롯마다 설정된 관계 함수를 모두 평가해 한 행으로 내보냅니다.
//!
//! - 어떤 컬럼이든 값이 하나라도 있으면 행을 내보내고, 값이 없는 컬럼은 `None`입니다.
//! - 모든 컬럼이 `None`인 슬롯은 내보내지 않습니다.
//! - 시간 구간이 이전보다 작아져도 실패하지 않고 경고 후 새 번들을 시작합니다.

use serde::Serialize;

use timebin_core::error::TimebinError;
use timebin_core::metrics as m;
use timebin_core::pipeline::Stage;
use timebin_core::spec::{RelationshipSpec, resolve_args};
use timebin_core::types::{Field, Row, Schema, Tuple};

use crate::bundle::Bundle;
use crate::error::AnalysisError;
use crate::registry::{FunctionRegistry, RelationshipFn};

const STAGE: &str = "relationship";

/// 출력 행의 고정 컬럼
pub const RELATION_KEY_COLUMNS: [&str; 3] = ["timebin", "key", "subkey"];

/// 관계 분석 출력 행
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationRow {
    pub time_bin: i64,
    pub key: String,
    pub subkey: String,
    /// 설정 순서의 컬럼 값. `None`은 데이터 없음
    pub values: Vec<Option<f64>>,
}

impl RelationRow {
    /// 출력 행으로 변환합니다. 값이 없는 컬럼은 빈 필드입니다.
    pub fn into_row(self) -> Row {
        let mut fields = Vec::with_capacity(3 + self.values.len());
        fields.push(Field::Int(self.time_bin));
        fields.push(Field::Text(self.key));
        fields.push(Field::Text(self.subkey));
        fields.extend(self.values.into_iter().map(Field::from));
        Row::new(fields)
    }
}

/// Relationship Analyzer 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipStats {
    pub tuples_in: u64,
    pub bundles: u64,
    pub rows_out: u64,
    /// 모든 컬럼이 비어 내보내지 않은 슬롯 수
    pub rows_empty: u64,
}

/// 번들 단위 관계 분석 스테이지
pub struct RelationshipAnalyzer {
    columns: Vec<(String, Box<dyn RelationshipFn>)>,
    bundle: Option<Bundle>,
    stats: RelationshipStats,
}

impl RelationshipAnalyzer {
    /// `(컬럼 이름, 관계 함수)` 목록으로 생성합니다.
    pub fn new(columns: Vec<(String, Box<dyn RelationshipFn>)>) -> Self {
        Self {
            columns,
            bundle: None,
            stats: RelationshipStats::default(),
        }
    }

    /// `relationshipAnalysis` 명세 섹션에서 구성합니다.
    ///
    /// 인자는 인덱스 이름과 키 문자열이므로 빈 스키마로 해석합니다.
    pub fn from_spec(
        spec: &RelationshipSpec,
        registry: &FunctionRegistry,
    ) -> Result<Self, AnalysisError> {
        if spec.outputs.is_empty() {
            return Err(AnalysisError::invalid_args(
                "relationshipAnalysis.outputs",
                "must define at least one output column",
            ));
        }
        let schema = Schema::default();
        let mut columns = Vec::with_capacity(spec.outputs.len());
        for (name, function) in &spec.outputs {
            let args = resolve_args(&function.arguments, &schema)?;
            columns.push((name.clone(), registry.relationship(&function.function, &args)?));
        }
        tracing::info!(columns = columns.len(), "relationship analyzer ready");
        Ok(Self::new(columns))
    }

    /// 출력 컬럼 이름 (설정 순서)
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// `timebin, key, subkey` 뒤에 출력 컬럼을 붙인 헤더
    pub fn header(&self) -> Vec<String> {
        RELATION_KEY_COLUMNS
            .iter()
            .map(|c| (*c).to_owned())
            .chain(self.columns.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn stats(&self) -> RelationshipStats {
        self.stats
    }

    fn evaluate(&mut self, bundle: &Bundle, out: &mut Vec<RelationRow>) {
        let before = self.stats.rows_out;
        for slot in bundle.iter() {
            let values: Vec<Option<f64>> = self
                .columns
                .iter_mut()
                .map(|(_, f)| f.evaluate(bundle, &slot.key, &slot.subkey, &slot.values))
                .collect();
            if values.iter().all(Option::is_none) {
                self.stats.rows_empty += 1;
                continue;
            }
            out.push(RelationRow {
                time_bin: bundle.time_bin(),
                key: slot.key.clone(),
                subkey: slot.subkey.clone(),
                values,
            });
            self.stats.rows_out += 1;
        }

        let emitted = self.stats.rows_out - before;
        self.stats.bundles += 1;
        metrics::counter!(m::RELATIONSHIP_BUNDLES_TOTAL).increment(1);
        metrics::counter!(m::RELATIONSHIP_ROWS_TOTAL).increment(emitted);
        metrics::counter!(m::STAGE_BINS_FLUSHED_TOTAL, m::LABEL_STAGE => STAGE).increment(1);
        tracing::debug!(
            time_bin = bundle.time_bin(),
            slots = bundle.len(),
            rows = emitted,
            "evaluated bundle"
        );
    }
}

impl Stage for RelationshipAnalyzer {
    type Input = Tuple;
    type Output = RelationRow;

    fn name(&self) -> &'static str {
        STAGE
    }

    fn push(&mut self, tuple: Tuple, out: &mut Vec<RelationRow>) -> Result<(), TimebinError> {
        self.stats.tuples_in += 1;
        let closed = match self.bundle.as_ref().map(Bundle::time_bin) {
            Some(previous) if previous == tuple.time_bin => None,
            Some(previous) => {
                if tuple.time_bin < previous {
                    tracing::warn!(
                        previous,
                        current = tuple.time_bin,
                        key = %tuple.key,
                        "time bin went backwards, starting a new bundle"
                    );
                }
                self.bundle.replace(Bundle::new(tuple.time_bin))
            }
            None => {
                self.bundle = Some(Bundle::new(tuple.time_bin));
                None
            }
        };
        if let Some(done) = closed {
            self.evaluate(&done, out);
        }
        if let Some(bundle) = self.bundle.as_mut() {
            bundle.insert_tuple(&tuple);
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<RelationRow>) -> Result<(), TimebinError> {
        if let Some(done) = self.bundle.take() {
            self.evaluate(&done, out);
        }
        Ok(())
    }

    fn discard(&mut self) -> usize {
        self.bundle.take().map_or(0, |b| b.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebin_core::spec::AnalysisSpec;

    fn analyzer(yaml: &str) -> RelationshipAnalyzer {
        let spec = AnalysisSpec::parse(yaml).expect("valid spec");
        RelationshipAnalyzer::from_spec(
            spec.relationship_analysis().expect("section"),
            &FunctionRegistry::with_defaults(),
        )
        .expect("valid functions")
    }

    fn run(a: RelationshipAnalyzer, input: Vec<Tuple>) -> Vec<RelationRow> {
        a.process(input.into_iter().map(Ok))
            .collect::<Result<_, _>>()
            .expect("no errors")
    }

    const FRACTION: &str = r#"
relationshipAnalysis:
  outputs:
    col1:
      function: fraction
      arguments: [data1, data2]
"#;

    #[test]
    fn fraction_of_matching_slots() {
        let out = run(
            analyzer(FRACTION),
            vec![
                Tuple::new(60, "data1", "k1", "s1", 10.0),
                Tuple::new(60, "data2", "k1", "s1", 10.0),
            ],
        );
        assert_eq!(
            out,
            vec![RelationRow {
                time_bin: 60,
                key: "k1".to_owned(),
                subkey: "s1".to_owned(),
                values: vec![Some(1.0)],
            }]
        );
    }

    #[test]
    fn slots_with_no_values_are_dropped() {
        let out = run(
            analyzer(FRACTION),
            vec![
                Tuple::new(60, "data1", "k1", "s1", 10.0),
                Tuple::new(60, "other", "k2", "", 1.0),
            ],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn absent_columns_are_kept_as_none() {
        let a = analyzer(
            r#"
relationshipAnalysis:
  outputs:
    ratio: {function: fraction, arguments: [data1, data2]}
    raw: {function: value, arguments: [data1]}
"#,
        );
        let out = run(a, vec![Tuple::new(0, "data1", "k", "", 4.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values, vec![None, Some(4.0)]);
        assert_eq!(
            out[0].clone().into_row().fields()[3..],
            [Field::Empty, Field::Float(4.0)]
        );
    }

    #[test]
    fn bundles_close_on_time_change_in_arrival_order() {
        let a = analyzer("relationshipAnalysis:\n  outputs:\n    v: {function: value, arguments: [i]}\n");
        let out = run(
            a,
            vec![
                Tuple::new(0, "i", "b", "", 1.0),
                Tuple::new(0, "i", "a", "", 2.0),
                Tuple::new(60, "i", "a", "", 3.0),
            ],
        );
        let coords: Vec<_> = out.iter().map(|r| (r.time_bin, r.key.as_str())).collect();
        assert_eq!(coords, vec![(0, "b"), (0, "a"), (60, "a")]);
    }

    #[test]
    fn backwards_time_opens_new_bundle() {
        let a = analyzer("relationshipAnalysis:\n  outputs:\n    v: {function: value, arguments: [i]}\n");
        let out = run(
            a,
            vec![
                Tuple::new(120, "i", "k", "", 1.0),
                Tuple::new(60, "i", "k", "", 2.0),
            ],
        );
        let bins: Vec<_> = out.iter().map(|r| r.time_bin).collect();
        assert_eq!(bins, vec![120, 60]);
    }

    #[test]
    fn value_max_survives_bundles() {
        let a = analyzer("relationshipAnalysis:\n  outputs:\n    m: {function: value_max, arguments: [i]}\n");
        let out = run(
            a,
            vec![
                Tuple::new(0, "i", "k", "", 5.0),
                Tuple::new(60, "i", "k", "", 2.0),
            ],
        );
        let values: Vec<_> = out.iter().map(|r| r.values[0]).collect();
        assert_eq!(values, vec![Some(5.0), Some(5.0)]);
    }

    #[test]
    fn header_lists_key_and_output_columns() {
        let a = analyzer(FRACTION);
        assert_eq!(a.header(), vec!["timebin", "key", "subkey", "col1"]);
        assert_eq!(a.column_names(), vec!["col1"]);
    }

    #[test]
    fn unknown_relationship_function_is_rejected() {
        let spec = AnalysisSpec::parse(
            "relationshipAnalysis:\n  outputs:\n    x: {function: median, arguments: []}\n",
        )
        .expect("parses");
        let err = RelationshipAnalyzer::from_spec(
            spec.relationship_analysis().expect("section"),
            &FunctionRegistry::with_defaults(),
        )
        .err()
        .expect("unknown");
        assert!(matches!(err, AnalysisError::UnknownFunction { .. }));
    }

    #[test]
    fn discard_reports_open_slots() {
        let mut a = analyzer(FRACTION);
        let mut out = Vec::new();
        a.push(Tuple::new(0, "data1", "k", "", 1.0), &mut out).expect("ok");
        a.push(Tuple::new(0, "data1", "j", "", 1.0), &mut out).expect("ok");
        assert_eq!(a.discard(), 2);
        a.finish(&mut out).expect("ok");
        assert!(out.is_empty());
    }

    #[test]
    fn relation_rows_serialize_with_nulls() {
        let row = RelationRow {
            time_bin: 60,
            key: "k".to_owned(),
            subkey: String::new(),
            values: vec![None, Some(0.5)],
        };
        let json = serde_json::to_string(&row).expect("serialize");
        assert_eq!(
            json,
            r#"{"time_bin":60,"key":"k","subkey":"","values":[null,0.5]}"#
        );
    }
}
