#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`types`]: 행, 필드, 스키마, 튜플과 시간 구간 계산
//! - [`error`]: 최상위 에러와 도메인별 하위 에러
//! - [`config`]: `timebin.toml` 런타임 설정
//! - [`spec`]: YAML 분석 명세와 인자 지정자
//! - [`pipeline`]: `Stage` trait과 풀 방식 어댑터
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod spec;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, StageError, TimebinError};

// 설정
pub use config::TimebinConfig;

// 명세
pub use spec::{AnalysisSpec, Arg, ArgSpec, UniqueScope};

// 스테이지
pub use pipeline::{Stage, StageIter};

// 도메인 타입
pub use types::{Field, Row, Schema, Tuple, time_bin};
