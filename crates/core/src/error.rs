//! 에러 타입 -- 도메인별 에러 정의

/// timebin 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TimebinError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스테이지 처리 에러
    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimebinError {
    /// 설정 에러인지 확인합니다.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// 시간 역행 에러인지 확인합니다.
    pub fn is_out_of_order(&self) -> bool {
        matches!(self, Self::Stage(StageError::TimeWentBackwards { .. }))
    }
}

/// 설정 관련 에러
///
/// 모두 행을 처리하기 전, 파이프라인 구성 시점에 발생합니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 분석 명세에 필요한 섹션이 없음
    #[error("'{section}' section missing from analysis specification")]
    MissingSection { section: String },

    /// 등록되지 않은 함수 이름
    #[error("unknown {kind} function '{name}'")]
    UnknownFunction { kind: String, name: String },

    /// 스키마에서 찾을 수 없는 컬럼
    #[error("column '{name}' not found in input schema")]
    UnresolvedColumn { name: String },
}

/// 스테이지 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// 정렬되지 않은 입력 (시간 역행)
    #[error(
        "time went backwards in {stage}: bin {current} after {previous} \
         (index '{index}', key '{key}'); input must be sorted by time"
    )]
    TimeWentBackwards {
        stage: String,
        previous: i64,
        current: i64,
        index: String,
        key: String,
    },

    /// 해석할 수 없는 입력 레코드
    #[error("malformed input to {stage}: {reason}")]
    Malformed { stage: String, reason: String },

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_timebin_error() {
        let err: TimebinError = ConfigError::FileNotFound {
            path: "/etc/timebin.toml".to_owned(),
        }
        .into();
        assert!(err.is_config());
        assert!(err.to_string().contains("/etc/timebin.toml"));
    }

    #[test]
    fn unknown_function_message_names_kind() {
        let err = ConfigError::UnknownFunction {
            kind: "extractor".to_owned(),
            name: "nope".to_owned(),
        };
        assert_eq!(err.to_string(), "unknown extractor function 'nope'");
    }

    #[test]
    fn time_went_backwards_identifies_stage_and_coordinate() {
        let err: TimebinError = StageError::TimeWentBackwards {
            stage: "aggregator".to_owned(),
            previous: 120,
            current: 60,
            index: "i".to_owned(),
            key: "k".to_owned(),
        }
        .into();
        assert!(err.is_out_of_order());
        let msg = err.to_string();
        assert!(msg.contains("aggregator"));
        assert!(msg.contains("bin 60 after 120"));
        assert!(msg.contains("index 'i'"));
        assert!(msg.contains("key 'k'"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TimebinError = io.into();
        assert!(matches!(err, TimebinError::Io(_)));
        assert!(!err.is_config());
    }

    #[test]
    fn malformed_message() {
        let err = StageError::Malformed {
            stage: "relationship".to_owned(),
            reason: "expected 5 fields, got 2".to_owned(),
        };
        assert!(err.to_string().contains("relationship"));
    }
}
