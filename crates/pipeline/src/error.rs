//! 파이프라인 에러 타입
//!
//! [`AnalysisError`]는 함수 구성과 스테이지 처리 중 발생하는 에러를 표현합니다.
//! `From<AnalysisError> for TimebinError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use timebin_core::error::{ConfigError, StageError, TimebinError};

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// 등록되지 않은 함수
    #[error("unknown {kind} function '{name}'")]
    UnknownFunction {
        /// 함수 종류 (extractor, value, combine 등)
        kind: String,
        /// 요청된 이름
        name: String,
    },

    /// 함수 인자가 잘못됨
    #[error("invalid arguments for '{function}': {reason}")]
    InvalidArguments {
        /// 함수 이름
        function: String,
        /// 사유
        reason: String,
    },

    /// 정규식 컴파일 실패
    #[error("invalid regex for '{function}': {source}")]
    Regex {
        /// 함수 이름
        function: String,
        #[source]
        source: regex::Error,
    },

    /// 명세/인자 해석 실패
    #[error(transparent)]
    Spec(#[from] ConfigError),

    /// 정렬되지 않은 입력
    #[error("time went backwards in {stage}: bin {current} after {previous}")]
    TimeWentBackwards {
        stage: String,
        previous: i64,
        current: i64,
        index: String,
        key: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl AnalysisError {
    pub(crate) fn invalid_args(function: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            function: function.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<AnalysisError> for TimebinError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::UnknownFunction { kind, name } => {
                TimebinError::Config(ConfigError::UnknownFunction { kind, name })
            }
            AnalysisError::InvalidArguments { function, reason } => {
                TimebinError::Config(ConfigError::InvalidValue {
                    field: function,
                    reason,
                })
            }
            AnalysisError::Regex { function, source } => {
                TimebinError::Config(ConfigError::InvalidValue {
                    field: function,
                    reason: source.to_string(),
                })
            }
            AnalysisError::Spec(e) => TimebinError::Config(e),
            AnalysisError::TimeWentBackwards {
                stage,
                previous,
                current,
                index,
                key,
            } => TimebinError::Stage(StageError::TimeWentBackwards {
                stage,
                previous,
                current,
                index,
                key,
            }),
            AnalysisError::Channel(msg) => TimebinError::Stage(StageError::ChannelSend(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_function_maps_to_config_error() {
        let err: TimebinError = AnalysisError::UnknownFunction {
            kind: "combine".to_owned(),
            name: "avg".to_owned(),
        }
        .into();
        assert!(err.is_config());
        assert!(err.to_string().contains("avg"));
    }

    #[test]
    fn invalid_arguments_display() {
        let err = AnalysisError::invalid_args("identity", "expected a column");
        assert_eq!(
            err.to_string(),
            "invalid arguments for 'identity': expected a column"
        );
    }

    #[test]
    fn regex_error_keeps_function_name() {
        let source = regex::Regex::new("(").expect_err("unbalanced");
        let err = AnalysisError::Regex {
            function: "exclude_exprs".to_owned(),
            source,
        };
        assert!(err.to_string().contains("exclude_exprs"));
        let top: TimebinError = err.into();
        assert!(top.is_config());
    }

    #[test]
    fn ordering_error_maps_to_stage_error() {
        let err: TimebinError = AnalysisError::TimeWentBackwards {
            stage: "aggregator".to_owned(),
            previous: 120,
            current: 60,
            index: "i".to_owned(),
            key: "k".to_owned(),
        }
        .into();
        assert!(err.is_out_of_order());
    }

    #[test]
    fn spec_error_is_transparent() {
        let err = AnalysisError::from(ConfigError::UnresolvedColumn {
            name: "qname".to_owned(),
        });
        assert_eq!(err.to_string(), "column 'qname' not found in input schema");
    }
}
