//! 값 함수
//!
//! 모든 값 함수는 해석할 수 없는 입력에 0을 반환합니다.

use timebin_core::spec::Arg;
use timebin_core::types::{Field, Row};

use super::column_arg;
use crate::error::AnalysisError;
use crate::registry::{FunctionRegistry, ValueFn};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_value("one", |_| Ok(Box::new(One)))
        .register_value("column_value", |args| {
            Ok(Box::new(ColumnValue::new("column_value", args, Numeric::Float)?))
        })
        .register_value("column_value_int", |args| {
            Ok(Box::new(ColumnValue::new("column_value_int", args, Numeric::Int)?))
        })
        .register_value("column_value_float", |args| {
            Ok(Box::new(ColumnValue::new("column_value_float", args, Numeric::Float)?))
        })
        .register_value("fraction", |args| Ok(Box::new(ColumnFraction::new(args)?)))
        .register_value("value_max", |args| Ok(Box::new(RunningMax::new(args)?)));
}

/// 항상 1
pub struct One;

impl ValueFn for One {
    fn value(&mut self, _row: &Row) -> f64 {
        1.0
    }
}

/// 숫자 변환 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numeric {
    /// 정수로 자른 값
    Int,
    /// 실수 값
    Float,
}

impl Numeric {
    fn convert(self, field: Option<&Field>) -> f64 {
        match (self, field) {
            (Self::Float, Some(f)) => f.as_f64().unwrap_or(0.0),
            (Self::Int, Some(Field::Int(n))) => *n as f64,
            (Self::Int, Some(Field::Float(x))) => x.trunc(),
            (Self::Int, Some(Field::Text(s))) => s.trim().parse::<i64>().map_or(0.0, |n| n as f64),
            _ => 0.0,
        }
    }
}

/// 한 컬럼의 숫자 값
pub struct ColumnValue {
    column: usize,
    numeric: Numeric,
}

impl ColumnValue {
    pub fn new(function: &str, args: &[Arg], numeric: Numeric) -> Result<Self, AnalysisError> {
        Ok(Self {
            column: column_arg(function, args, 0)?,
            numeric,
        })
    }
}

impl ValueFn for ColumnValue {
    fn value(&mut self, row: &Row) -> f64 {
        self.numeric.convert(row.get(self.column))
    }
}

/// 두 컬럼의 비율. 분모가 0이거나 없으면 0입니다.
pub struct ColumnFraction {
    numerator: usize,
    denominator: usize,
}

impl ColumnFraction {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            numerator: column_arg("fraction", args, 0)?,
            denominator: column_arg("fraction", args, 1)?,
        })
    }
}

impl ValueFn for ColumnFraction {
    fn value(&mut self, row: &Row) -> f64 {
        let numerator = row.number(self.numerator).unwrap_or(0.0);
        match row.number(self.denominator) {
            Some(d) if d != 0.0 => numerator / d,
            _ => 0.0,
        }
    }
}

/// 지금까지 본 컬럼 값의 최댓값
///
/// 상태는 함수 인스턴스마다 따로 가집니다.
pub struct RunningMax {
    column: usize,
    max: Option<f64>,
}

impl RunningMax {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            column: column_arg("value_max", args, 0)?,
            max: None,
        })
    }
}

impl ValueFn for RunningMax {
    fn value(&mut self, row: &Row) -> f64 {
        let v = row.number(self.column).unwrap_or(0.0);
        let max = self.max.map_or(v, |m| m.max(v));
        self.max = Some(max);
        max
    }
}
