//! 메트릭 상수
//!
//! 모든 스테이지 메트릭의 이름을 중앙에서 정의합니다.
//! 각 스테이지는 이 상수로 `metrics::counter!()` 매크로를 호출합니다.
//! 익스포터는 설치하지 않으며, 호스트 애플리케이션이 recorder를 등록하면 수집됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `timebin_`
//! - 스테이지명: `counter_`, `aggregator_`, `relationship_`, `edge_detect_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! metrics::counter!(timebin_core::metrics::COUNTER_ROWS_TOTAL).increment(1);
//! ```

/// 스테이지 레이블 키
pub const LABEL_STAGE: &str = "stage";

// ─── Feature Counter ───────────────────────────────────────────────

/// Feature Counter: 읽은 행 수
pub const COUNTER_ROWS_TOTAL: &str = "timebin_counter_rows_total";

/// Feature Counter: 필터로 제외된 행 수
pub const COUNTER_ROWS_FILTERED_TOTAL: &str = "timebin_counter_rows_filtered_total";

/// Feature Counter: 시간 컬럼이 없거나 숫자가 아니어서 건너뛴 행 수
pub const COUNTER_ROWS_SKIPPED_TOTAL: &str = "timebin_counter_rows_skipped_total";

/// Feature Counter: 방출한 튜플 수
pub const COUNTER_TUPLES_TOTAL: &str = "timebin_counter_tuples_total";

// ─── Aggregator ────────────────────────────────────────────────────

/// Aggregator: 입력 튜플 수
pub const AGGREGATOR_TUPLES_IN_TOTAL: &str = "timebin_aggregator_tuples_in_total";

/// Aggregator: 방출한 튜플 수
pub const AGGREGATOR_TUPLES_OUT_TOTAL: &str = "timebin_aggregator_tuples_out_total";

// ─── Relationship Analyzer ─────────────────────────────────────────

/// Relationship Analyzer: 처리한 번들 수
pub const RELATIONSHIP_BUNDLES_TOTAL: &str = "timebin_relationship_bundles_total";

/// Relationship Analyzer: 방출한 행 수
pub const RELATIONSHIP_ROWS_TOTAL: &str = "timebin_relationship_rows_total";

// ─── Edge Detector ─────────────────────────────────────────────────

/// Edge Detector: 처리한 시간 구간 수
pub const EDGE_DETECT_BINS_TOTAL: &str = "timebin_edge_detect_bins_total";

/// Edge Detector: 방출한 이벤트 행 수
pub const EDGE_DETECT_EVENTS_TOTAL: &str = "timebin_edge_detect_events_total";

// ─── 공통 ──────────────────────────────────────────────────────────

/// 종료 시 플러시한 시간 구간 수 (label: stage)
pub const STAGE_BINS_FLUSHED_TOTAL: &str = "timebin_stage_bins_flushed_total";

/// 취소로 버려진 슬롯 수 (label: stage)
pub const STAGE_SLOTS_DISCARDED_TOTAL: &str = "timebin_stage_slots_discarded_total";
