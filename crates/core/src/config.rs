//! 설정 관리 -- timebin.toml 파싱 및 런타임 설정
//!
//! [`TimebinConfig`]는 런타임 동작(로깅, 기본 구간 크기, 채널 용량)을 담습니다.
//! 무엇을 계산할지는 YAML 분석 명세([`crate::spec::AnalysisSpec`])가 결정합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TIMEBIN_DEFAULTS_BIN_SIZE=300` 형식)
//! 3. 설정 파일 (`timebin.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), timebin_core::error::TimebinError> {
//! use timebin_core::config::TimebinConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TimebinConfig::load("timebin.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TimebinConfig::parse("[defaults]\nbin_size = 300")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TimebinError};
use crate::types::DEFAULT_BIN_SIZE;

/// 허용되는 로그 레벨
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 허용되는 로그 형식
pub const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];

/// timebin 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimebinConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스테이지 기본값
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl TimebinConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TimebinError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에서 시작하는 [`load`](Self::load)입니다.
    ///
    /// 파일이 있지만 형식이 잘못된 경우는 에러입니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, TimebinError> {
        let mut config = match Self::from_file(path.as_ref()).await {
            Ok(config) => config,
            Err(TimebinError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
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
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TimebinError> {
        toml::from_str(toml_str).map_err(|e| {
            TimebinError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TIMEBIN_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "TIMEBIN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TIMEBIN_GENERAL_LOG_FORMAT");

        override_u32(&mut self.defaults.bin_size, "TIMEBIN_DEFAULTS_BIN_SIZE");
        override_string(
            &mut self.defaults.time_column,
            "TIMEBIN_DEFAULTS_TIME_COLUMN",
        );
        override_usize(
            &mut self.defaults.channel_capacity,
            "TIMEBIN_DEFAULTS_CHANNEL_CAPACITY",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TimebinError> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            }
            .into());
        }

        if !VALID_LOG_FORMATS.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", VALID_LOG_FORMATS.join(", ")),
            }
            .into());
        }

        if self.defaults.bin_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "defaults.bin_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.defaults.time_column.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "defaults.time_column".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.defaults.channel_capacity == 0 || self.defaults.channel_capacity > 1_000_000 {
            return Err(ConfigError::InvalidValue {
                field: "defaults.channel_capacity".to_owned(),
                reason: "must be 1-1000000".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 스테이지 기본값
///
/// 분석 명세에 값이 없을 때만 사용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// 시간 구간 크기 (초)
    pub bin_size: u32,
    /// 시간 컬럼 이름
    pub time_column: String,
    /// 스테이지 간 채널 용량
    pub channel_capacity: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            bin_size: DEFAULT_BIN_SIZE,
            time_column: "time".to_owned(),
            channel_capacity: 1024,
        }
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}
