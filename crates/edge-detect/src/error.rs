//! 변화 탐지 에러 타입
//!
//! [`EdgeDetectError`]는 `From<EdgeDetectError> for TimebinError`를 구현하므로
//! 상위 레이어에서 `?`로 전파할 수 있습니다.

use timebin_core::error::{ConfigError, StageError, TimebinError};

/// 변화 탐지 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EdgeDetectError {
    /// 유효하지 않은 설정 값
    #[error("invalid edge detect config '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// 명세/컬럼 해석 실패
    #[error(transparent)]
    Spec(#[from] ConfigError),

    /// 정렬되지 않은 입력 (이전 구간보다 작은 구간)
    #[error("time went backwards in {stage}: bin {current} after {previous} (key '{key}')")]
    TimeWentBackwards {
        stage: String,
        previous: i64,
        current: i64,
        key: String,
    },
}

impl EdgeDetectError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<EdgeDetectError> for TimebinError {
    fn from(err: EdgeDetectError) -> Self {
        match err {
            EdgeDetectError::InvalidConfig { field, reason } => {
                TimebinError::Config(ConfigError::InvalidValue { field, reason })
            }
            EdgeDetectError::Spec(e) => TimebinError::Config(e),
            EdgeDetectError::TimeWentBackwards {
                stage,
                previous,
                current,
                key,
            } => TimebinError::Stage(StageError::TimeWentBackwards {
                stage,
                previous,
                current,
                index: String::new(),
                key,
            }),
        }
    }
}
