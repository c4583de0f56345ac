#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`registry`]: 이름 기반 함수 레지스트리와 함수 trait
//! - [`functions`]: 내장 함수 라이브러리 (추출, 값, 결합, 필터, 관계, 집계, DNS)
//! - [`counter`]: Feature Counter 스테이지
//! - [`aggregator`]: 튜플 재집계 스테이지
//! - [`bundle`]: 한 시간 구간의 `key -> subkey -> index -> value` 묶음
//! - [`relationship`]: Relationship Analyzer 스테이지
//! - [`runner`]: 채널 기반 스테이지 실행기
//! - [`config`]: Feature Counter 설정
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! rows -> FeatureCounter -> tuples -> Aggregator -> tuples -> RelationshipAnalyzer -> rows
//!              |                          |                          |
//!   filters/extract/value/combine   sum/unique/...          fraction/lookup/dns...
//! ```

pub mod aggregator;
pub mod bundle;
pub mod config;
pub mod counter;
pub mod error;
pub mod functions;
pub mod registry;
pub mod relationship;
pub mod runner;

// --- 주요 타입 re-export ---

// 스테이지
pub use aggregator::{Aggregator, AggregatorStats, BinResults};
pub use counter::{CounterStats, FeatureCounter};
pub use relationship::{RelationRow, RelationshipAnalyzer, RelationshipStats};

// 설정
pub use config::{CounterConfig, CounterConfigBuilder, ReleaseMode};

// 에러
pub use error::AnalysisError;

// 레지스트리
pub use registry::{FunctionKind, FunctionRegistry};

// 번들
pub use bundle::Bundle;

// 도메인 분류기
pub use functions::dns::{DomainClassifier, DomainParts, SuffixList};

// 실행기
pub use runner::{RunOutcome, RunReport, StageRunner, spawn_stage};
