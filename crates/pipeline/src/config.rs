//! Feature Counter 설정
//!
//! [`CounterConfig`]는 분석 명세의 `timeColumn`/`binSize`와 런타임 설정의
//! `[defaults]`를 합쳐 Feature Counter 실행 설정을 만듭니다.
//! 명세 값이 있으면 명세가 우선합니다.
//!
//! # 사용 예시
//! ```ignore
//! let config = CounterConfig::from_spec(&spec, &runtime.defaults);
//! let counter = FeatureCounter::new(config, spec.feature_counter()?, &schema, &registry)?;
//! ```

use serde::{Deserialize, Serialize};
use timebin_core::config::DefaultsConfig;
use timebin_core::spec::{AnalysisSpec, ArgSpec};
use timebin_core::types::DEFAULT_BIN_SIZE;

use crate::error::AnalysisError;

/// 완성된 시간 구간을 내보내는 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseMode {
    /// 입력이 끝난 뒤 모든 구간을 한 번에 내보냄
    Bulk,
    /// 시간 구간이 바뀔 때마다 이전 구간을 내보냄 (시간순 입력 전제)
    #[default]
    Incremental,
}

/// Feature Counter 실행 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// 시간 컬럼 (이름, `col(name)` 또는 위치)
    pub time_column: ArgSpec,
    /// 시간 구간 크기 (초)
    pub bin_size: u32,
    /// 구간 방출 방식
    pub mode: ReleaseMode,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            time_column: ArgSpec::Int(0),
            bin_size: DEFAULT_BIN_SIZE,
            mode: ReleaseMode::default(),
        }
    }
}

impl CounterConfig {
    /// 명세와 런타임 기본값에서 설정을 만듭니다.
    pub fn from_spec(spec: &AnalysisSpec, defaults: &DefaultsConfig) -> Self {
        Self {
            time_column: spec
                .time_column
                .clone()
                .unwrap_or_else(|| ArgSpec::Text(defaults.time_column.clone())),
            bin_size: spec.bin_size.unwrap_or(defaults.bin_size),
            mode: ReleaseMode::default(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.bin_size == 0 {
            return Err(AnalysisError::invalid_args(
                "bin_size",
                "must be greater than 0",
            ));
        }
        if let ArgSpec::Int(n) = self.time_column
            && n < 0
        {
            return Err(AnalysisError::invalid_args(
                "time_column",
                format!("column position {n} is negative"),
            ));
        }
        Ok(())
    }
}

/// Feature Counter 설정 빌더
#[derive(Default)]
pub struct CounterConfigBuilder {
    config: CounterConfig,
}

impl CounterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 시간 컬럼을 설정합니다.
    pub fn time_column(mut self, column: impl Into<ArgSpec>) -> Self {
        self.config.time_column = column.into();
        self
    }

    /// 시간 구간 크기(초)를 설정합니다.
    pub fn bin_size(mut self, secs: u32) -> Self {
        self.config.bin_size = secs;
        self
    }

    /// 방출 방식을 설정합니다.
    pub fn mode(mut self, mode: ReleaseMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// 설정을 검증하고 `CounterConfig`를 생성합니다.
    pub fn build(self) -> Result<CounterConfig, AnalysisError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CounterConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.bin_size, 60);
        assert_eq!(config.time_column, ArgSpec::Int(0));
        assert_eq!(config.mode, ReleaseMode::Incremental);
    }

    #[test]
    fn spec_values_override_runtime_defaults() {
        let spec = AnalysisSpec::parse("timeColumn: ts\nbinSize: 300\n").expect("valid");
        let config = CounterConfig::from_spec(&spec, &DefaultsConfig::default());
        assert_eq!(config.time_column, ArgSpec::Text("ts".to_owned()));
        assert_eq!(config.bin_size, 300);
    }

    #[test]
    fn runtime_defaults_fill_missing_spec_values() {
        let defaults = DefaultsConfig {
            bin_size: 10,
            time_column: "when".to_owned(),
            ..DefaultsConfig::default()
        };
        let config = CounterConfig::from_spec(&AnalysisSpec::default(), &defaults);
        assert_eq!(config.time_column, ArgSpec::Text("when".to_owned()));
        assert_eq!(config.bin_size, 10);
    }

    #[test]
    fn builder_rejects_zero_bin_size() {
        let err = CounterConfigBuilder::new().bin_size(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let config = CounterConfigBuilder::new()
            .time_column("time")
            .bin_size(5)
            .mode(ReleaseMode::Bulk)
            .build()
            .expect("valid");
        assert_eq!(config.time_column, ArgSpec::Text("time".to_owned()));
        assert_eq!(config.mode, ReleaseMode::Bulk);
    }

    #[test]
    fn release_mode_serde_is_lowercase() {
        let json = serde_json::to_string(&ReleaseMode::Bulk).expect("serialize");
        assert_eq!(json, "\"bulk\"");
    }
}
