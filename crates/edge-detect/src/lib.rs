#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`window`]: 순환 버퍼 기반 슬라이딩 윈도우 합
//! - [`detector`]: 키별 시계열 변화 탐지 스테이지
//! - [`grouped`]: 긴 형식 변환과 시리즈별 변화 탐지
//! - [`config`]: 변화 탐지 설정 (명세 + 런타임 기본값)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod detector;
pub mod error;
pub mod grouped;
pub mod window;

// --- 주요 타입 re-export ---

// 설정
pub use config::{EdgeDetectConfig, EdgeDetectConfigBuilder, Thresholds};

// 에러
pub use error::EdgeDetectError;

// 윈도우
pub use window::AverageWindow;

// 스테이지
pub use detector::{ColumnReading, EdgeDetectStats, EdgeDetector, EdgeEvent};
pub use grouped::{GroupedEdgeDetector, LongFormat};
