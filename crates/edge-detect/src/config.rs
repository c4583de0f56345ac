//! 변화 탐지 설정
//!
//! 분석 명세의 `edgeDetect` 섹션, 최상위 `timeColumn`/`binSize`, 런타임
//! `[defaults]`를 합쳐 [`EdgeDetectConfig`]를 만듭니다. 컬럼별 임계값은
//! 지정하지 않은 항목만 전역 값으로 채웁니다.

use serde::{Deserialize, Serialize};
use timebin_core::config::DefaultsConfig;
use timebin_core::spec::{AnalysisSpec, ArgSpec, ColumnThresholds};
use timebin_core::types::DEFAULT_BIN_SIZE;

use crate::error::EdgeDetectError;

/// 기본 윈도우 크기
pub const DEFAULT_WINDOW_SIZE: usize = 5;
/// 0으로 나누기를 피하기 위한 최소 분모
pub const DEFAULT_MIN_INTERESTING: f64 = 0.000_001;

/// 변화 탐지 실행 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetectConfig {
    /// 시간 컬럼
    pub time_column: ArgSpec,
    /// 시계열을 구분하는 키 컬럼
    pub key_column: ArgSpec,
    /// 시간 구간 크기 (초)
    pub bin_size: u32,
    /// lhs/rhs 각각의 구간 수
    pub window_size: usize,
    /// lhs와 rhs 사이에서 무시하는 구간 수
    pub middle_size: usize,
    /// 전역 차이 임계값. `None`이면 차이 이벤트를 검사하지 않음
    pub zero_jump: Option<f64>,
    /// 전역 배율 임계값. `None`이면 배율 이벤트를 검사하지 않음
    pub scale_height: Option<f64>,
    /// 구간당 최소 값 (윈도우 합과 비교할 때 `window_size`를 곱함)
    pub min_value: f64,
    /// 배율 계산에서 분모로 인정하는 최솟값
    pub min_interesting: f64,
    /// 분석할 컬럼과 컬럼별 임계값 오버라이드.
    /// 긴 형식 모드에서는 시리즈 접두어로 찾는 오버라이드 목록으로만 쓰입니다.
    pub columns: Vec<ColumnThresholds>,
}

impl Default for EdgeDetectConfig {
    fn default() -> Self {
        Self {
            time_column: ArgSpec::Int(0),
            key_column: ArgSpec::Int(1),
            bin_size: DEFAULT_BIN_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            middle_size: 0,
            zero_jump: None,
            scale_height: None,
            min_value: 0.0,
            min_interesting: DEFAULT_MIN_INTERESTING,
            columns: Vec::new(),
        }
    }
}

/// 한 컬럼에 적용되는 최종 임계값
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub zero_jump: Option<f64>,
    pub scale_height: Option<f64>,
    /// 윈도우 합 기준 최소 값 (이미 `window_size`를 곱한 값)
    pub min_value: f64,
}

impl EdgeDetectConfig {
    /// 명세와 런타임 기본값에서 설정을 만듭니다.
    ///
    /// `edgeDetect` 섹션이 없으면 에러입니다.
    pub fn from_spec(
        spec: &AnalysisSpec,
        defaults: &DefaultsConfig,
    ) -> Result<Self, EdgeDetectError> {
        let edge = spec.edge_detect()?;
        let base = Self::default();
        let config = Self {
            time_column: spec
                .time_column
                .clone()
                .unwrap_or_else(|| ArgSpec::Text(defaults.time_column.clone())),
            key_column: edge.key_column.clone().unwrap_or(base.key_column),
            bin_size: spec.bin_size.unwrap_or(defaults.bin_size),
            window_size: edge.window_size.unwrap_or(base.window_size),
            middle_size: edge.middle_size.unwrap_or(base.middle_size),
            zero_jump: edge.zero_jump,
            scale_height: edge.scale_height,
            min_value: edge.min_value.unwrap_or(base.min_value),
            min_interesting: edge.min_interesting.unwrap_or(base.min_interesting),
            columns: edge.analyze_columns.iter().map(|c| c.thresholds()).collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EdgeDetectError> {
        if self.bin_size == 0 {
            return Err(EdgeDetectError::invalid("binSize", "must be greater than 0"));
        }
        if self.window_size == 0 {
            return Err(EdgeDetectError::invalid("windowSize", "must be greater than 0"));
        }
        if self.min_interesting.is_nan() || self.min_interesting <= 0.0 {
            return Err(EdgeDetectError::invalid("minInteresting", "must be positive"));
        }
        for (field, value) in [
            ("zeroJump", self.zero_jump),
            ("scaleHeight", self.scale_height),
            ("minValue", Some(self.min_value)),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(EdgeDetectError::invalid(field, "must be a non-negative number"));
            }
        }
        Ok(())
    }

    /// 이벤트 시각 보정값: 탐지 시각에서 이만큼 빼면 변화가 시작된 구간입니다.
    pub fn event_offset(&self) -> i64 {
        (2 * self.window_size as i64 + self.middle_size as i64 - 1) * i64::from(self.bin_size)
    }

    /// 이름이 `name`인 컬럼의 최종 임계값.
    ///
    /// 오버라이드가 없는 항목과 설정에 없는 컬럼은 전역 값을 씁니다.
    pub fn thresholds_for(&self, name: &str) -> Thresholds {
        let column = self.columns.iter().find(|c| c.name == name);
        let min_value = column
            .and_then(|c| c.min_value)
            .unwrap_or(self.min_value);
        Thresholds {
            zero_jump: column.and_then(|c| c.zero_jump).or(self.zero_jump),
            scale_height: column.and_then(|c| c.scale_height).or(self.scale_height),
            min_value: min_value * self.window_size as f64,
        }
    }

    /// 분석할 컬럼 이름 (설정 순서)
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// 변화 탐지 설정 빌더
#[derive(Default)]
pub struct EdgeDetectConfigBuilder {
    config: EdgeDetectConfig,
}

impl EdgeDetectConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 설정에서 시작합니다 (CLI 오버라이드용).
    pub fn from_config(config: EdgeDetectConfig) -> Self {
        Self { config }
    }

    pub fn time_column(mut self, column: impl Into<ArgSpec>) -> Self {
        self.config.time_column = column.into();
        self
    }

    pub fn key_column(mut self, column: impl Into<ArgSpec>) -> Self {
        self.config.key_column = column.into();
        self
    }

    pub fn bin_size(mut self, secs: u32) -> Self {
        self.config.bin_size = secs;
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn middle_size(mut self, size: usize) -> Self {
        self.config.middle_size = size;
        self
    }

    pub fn zero_jump(mut self, value: f64) -> Self {
        self.config.zero_jump = Some(value);
        self
    }

    pub fn scale_height(mut self, value: f64) -> Self {
        self.config.scale_height = Some(value);
        self
    }

    pub fn min_value(mut self, value: f64) -> Self {
        self.config.min_value = value;
        self
    }

    pub fn min_interesting(mut self, value: f64) -> Self {
        self.config.min_interesting = value;
        self
    }

    /// 전역 임계값을 쓰는 컬럼을 추가합니다.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.config.columns.push(ColumnThresholds {
            name: name.into(),
            ..ColumnThresholds::default()
        });
        self
    }

    /// 컬럼별 임계값과 함께 컬럼을 추가합니다.
    pub fn column_with(mut self, thresholds: ColumnThresholds) -> Self {
        self.config.columns.push(thresholds);
        self
    }

    /// 분석 컬럼 목록을 통째로 바꿉니다. 기존 오버라이드는 이름이 같으면 유지됩니다.
    pub fn replace_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = std::mem::take(&mut self.config.columns);
        self.config.columns = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                previous
                    .iter()
                    .find(|c| c.name == name)
                    .cloned()
                    .unwrap_or(ColumnThresholds {
                        name,
                        ..ColumnThresholds::default()
                    })
            })
            .collect();
        self
    }

    /// 설정을 검증하고 `EdgeDetectConfig`를 생성합니다.
    pub fn build(self) -> Result<EdgeDetectConfig, EdgeDetectError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "
timeColumn: timebin
binSize: 300
edgeDetect:
  keyColumn: key
  windowSize: 4
  middleSize: 1
  zeroJump: 20
  scaleHeight: 3
  minValue: 2
  analyzeColumns:
    - count
    - name: ratio
      zeroJump: 0.5
";

    #[test]
    fn from_spec_reads_section() {
        let spec = AnalysisSpec::parse(SPEC).expect("valid spec");
        let config = EdgeDetectConfig::from_spec(&spec, &DefaultsConfig::default()).expect("valid");
        assert_eq!(config.time_column, ArgSpec::Text("timebin".to_owned()));
        assert_eq!(config.key_column, ArgSpec::Text("key".to_owned()));
        assert_eq!(config.bin_size, 300);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.middle_size, 1);
        assert_eq!(config.column_names().collect::<Vec<_>>(), vec!["count", "ratio"]);
    }

    #[test]
    fn missing_section_is_an_error() {
        let spec = AnalysisSpec::parse("binSize: 60\n").expect("valid spec");
        let err = EdgeDetectConfig::from_spec(&spec, &DefaultsConfig::default());
        assert!(matches!(err, Err(EdgeDetectError::Spec(_))));
    }

    #[test]
    fn column_overrides_fall_back_to_globals() {
        let spec = AnalysisSpec::parse(SPEC).expect("valid spec");
        let config = EdgeDetectConfig::from_spec(&spec, &DefaultsConfig::default()).expect("valid");

        let count = config.thresholds_for("count");
        assert_eq!(count.zero_jump, Some(20.0));
        assert_eq!(count.scale_height, Some(3.0));
        assert_eq!(count.min_value, 8.0);

        let ratio = config.thresholds_for("ratio");
        assert_eq!(ratio.zero_jump, Some(0.5));
        assert_eq!(ratio.scale_height, Some(3.0));
    }

    #[test]
    fn event_offset_spans_window_and_middle() {
        let config = EdgeDetectConfigBuilder::new()
            .window_size(5)
            .middle_size(1)
            .bin_size(60)
            .column("count")
            .build()
            .expect("valid");
        assert_eq!(config.event_offset(), 10 * 60);
    }

    #[test]
    fn builder_rejects_invalid_values() {
        assert!(EdgeDetectConfigBuilder::new().column("c").window_size(0).build().is_err());
        assert!(
            EdgeDetectConfigBuilder::new()
                .column("c")
                .zero_jump(-1.0)
                .build()
                .is_err()
        );
        assert!(
            EdgeDetectConfigBuilder::new()
                .column("c")
                .min_interesting(0.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn replace_columns_keeps_matching_overrides() {
        let config = EdgeDetectConfigBuilder::new()
            .column_with(ColumnThresholds {
                name: "a".to_owned(),
                zero_jump: Some(1.0),
                ..ColumnThresholds::default()
            })
            .column("b")
            .replace_columns(["a", "c"])
            .build()
            .expect("valid");
        assert_eq!(config.columns.len(), 2);
        assert_eq!(config.columns[0].zero_jump, Some(1.0));
        assert_eq!(config.columns[1].name, "c");
    }

    #[test]
    fn config_serializes_to_json() {
        let config = EdgeDetectConfigBuilder::new().column("count").build().expect("valid");
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["window_size"], 5);
    }
}
