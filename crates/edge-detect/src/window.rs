//! 슬라이딩 윈도우 합
//!
//! 최근 `2 * window_size + middle_size`개의 값을 세 구간으로 나눠 들고 있습니다.
//!
//! ```text
//!   lhs (window_size) | middle (middle_size) | rhs (window_size)
//!   1 1 1 1           | 2 3                  | 9 9 9 9
//! ```
//!
//! 값이 들어오면 rhs의 가장 오래된 값이 middle로(없으면 바로 lhs로) 밀려나고,
//! middle의 가장 오래된 값이 lhs로, lhs의 가장 오래된 값은 버려집니다.
//! 세 구간 모두 순환 버퍼이므로 갱신은 윈도우 크기와 무관하게 O(1)입니다.
//!
//! 합은 평균이 아니라 원시 값의 합입니다. 처음에는 모두 0으로 채워져 있으므로
//! `span()`개를 넣기 전의 결과는 의미가 없습니다.

use crate::error::EdgeDetectError;

/// 왼쪽/오른쪽 합을 유지하는 순환 윈도우
#[derive(Debug, Clone)]
pub struct AverageWindow {
    lhs_data: Vec<f64>,
    middle_data: Vec<f64>,
    rhs_data: Vec<f64>,
    lhs: f64,
    rhs: f64,
    index: usize,
    middle: usize,
}

impl AverageWindow {
    /// 0으로 채워진 윈도우를 만듭니다. `window_size`는 1 이상이어야 합니다.
    pub fn new(window_size: usize, middle_size: usize) -> Result<Self, EdgeDetectError> {
        if window_size == 0 {
            return Err(EdgeDetectError::invalid(
                "windowSize",
                "must be greater than 0",
            ));
        }
        Ok(Self {
            lhs_data: vec![0.0; window_size],
            middle_data: vec![0.0; middle_size],
            rhs_data: vec![0.0; window_size],
            lhs: 0.0,
            rhs: 0.0,
            index: 0,
            middle: 0,
        })
    }

    pub fn window_size(&self) -> usize {
        self.rhs_data.len()
    }

    pub fn middle_size(&self) -> usize {
        self.middle_data.len()
    }

    /// 윈도우가 덮는 값의 개수 (`2 * window_size + middle_size`)
    pub fn span(&self) -> usize {
        2 * self.window_size() + self.middle_size()
    }

    /// 새 값을 오른쪽 끝에 넣습니다.
    pub fn add(&mut self, value: f64) {
        let leaving_rhs = self.rhs_data[self.index];
        let entering_lhs = if self.middle_data.is_empty() {
            leaving_rhs
        } else {
            let oldest = std::mem::replace(&mut self.middle_data[self.middle], leaving_rhs);
            self.middle = (self.middle + 1) % self.middle_data.len();
            oldest
        };

        self.lhs += entering_lhs - self.lhs_data[self.index];
        self.lhs_data[self.index] = entering_lhs;

        self.rhs += value - leaving_rhs;
        self.rhs_data[self.index] = value;

        self.index = (self.index + 1) % self.rhs_data.len();
    }

    /// 왼쪽 구간의 합
    pub fn lhs(&self) -> f64 {
        self.lhs
    }

    /// 오른쪽 구간의 합
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// `rhs - lhs`
    pub fn delta(&self) -> f64 {
        self.rhs - self.lhs
    }
}
