//! 결합 함수
//!
//! 같은 `(time_bin, index, key, subkey)` 슬롯에 두 번째 이후 값이 들어올 때
//! 기존 값과 새 값을 합칩니다. 첫 값은 `previous == None`으로 전달됩니다.

use crate::registry::{CombineFn, Coordinate, FunctionRegistry};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_combine("sum", |_| Ok(Box::new(Sum)))
        .register_combine("combine_summer", |_| Ok(Box::new(Sum)))
        .register_combine("max", |_| Ok(Box::new(Max)))
        .register_combine("combine_value_max", |_| Ok(Box::new(Max)));
}

/// 합계
pub struct Sum;

impl CombineFn for Sum {
    fn combine(&mut self, _at: Coordinate<'_>, previous: Option<f64>, incoming: f64) -> f64 {
        previous.unwrap_or(0.0) + incoming
    }
}

/// 최댓값
pub struct Max;

impl CombineFn for Max {
    fn combine(&mut self, _at: Coordinate<'_>, previous: Option<f64>, incoming: f64) -> f64 {
        previous.map_or(incoming, |p| p.max(incoming))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AT: Coordinate<'static> = Coordinate {
        time_bin: 0,
        index: "i",
        key: "k",
        subkey: "",
    };

    #[test]
    fn sum_starts_from_incoming() {
        assert_eq!(Sum.combine(AT, None, 2.0), 2.0);
        assert_eq!(Sum.combine(AT, Some(2.0), 3.0), 5.0);
    }

    #[test]
    fn max_keeps_larger_value() {
        assert_eq!(Max.combine(AT, None, -1.0), -1.0);
        assert_eq!(Max.combine(AT, Some(4.0), 3.0), 4.0);
        assert_eq!(Max.combine(AT, Some(4.0), 8.0), 8.0);
    }
}
