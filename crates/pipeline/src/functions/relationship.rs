//! 관계 함수
//!
//! 번들(한 시간 구간의 전체 값)과 현재 슬롯을 보고 파생 값을 계산합니다.
//! 참조하는 값이 없으면 `None`을 반환하고, 그 컬럼만 비어 있는 것으로 출력됩니다.
//!
//! 인자는 모두 인덱스 이름이나 키 문자열로 해석됩니다.

use std::collections::HashMap;

use timebin_core::spec::Arg;

use super::{require_args, text_arg};
use crate::bundle::{Bundle, SlotValues};
use crate::error::AnalysisError;
use crate::registry::{FunctionRegistry, RelationshipFn};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry
        .register_relationship("value", |args| Ok(Box::new(Value::new(args)?)))
        .register_relationship("one", |_| Ok(Box::new(One)))
        .register_relationship("fraction", |args| Ok(Box::new(Fraction::new(args)?)))
        .register_relationship("lookup", |args| {
            Ok(Box::new(Lookup::new("lookup", args, false)?))
        })
        .register_relationship("lookup_maybe_ra", |args| {
            Ok(Box::new(Lookup::new("lookup_maybe_ra", args, true)?))
        })
        .register_relationship("fraction_otherindex", |args| {
            Ok(Box::new(FractionOtherIndex::new(args)?))
        })
        .register_relationship("fraction_otherindex_keyval", |args| {
            Ok(Box::new(FractionSameKey::new(args)?))
        })
        .register_relationship("value_max", |args| Ok(Box::new(ValueMax::new(args)?)));
}

/// `bundle[key][subkey][index]`, 없으면 `bundle[key][index][index]`
pub fn lookup_lenient(bundle: &Bundle, key: &str, subkey: &str, index: &str) -> Option<f64> {
    bundle
        .lookup(key, subkey, index)
        .or_else(|| bundle.lookup(key, index, index))
}

/// 0이 아닌 분모일 때만 나눕니다.
pub(crate) fn ratio(numerator: f64, denominator: Option<f64>) -> Option<f64> {
    denominator
        .filter(|d| *d != 0.0)
        .map(|d| numerator / d)
}

/// 현재 슬롯의 한 인덱스 값
pub struct Value {
    index: String,
}

impl Value {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            index: text_arg("value", args, 0)?,
        })
    }
}

impl RelationshipFn for Value {
    fn evaluate(&mut self, _: &Bundle, _: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        slot.get(&self.index).copied()
    }
}

/// 항상 1
pub struct One;

impl RelationshipFn for One {
    fn evaluate(&mut self, _: &Bundle, _: &str, _: &str, _: &SlotValues) -> Option<f64> {
        Some(1.0)
    }
}

/// 현재 슬롯의 두 인덱스 비율
pub struct Fraction {
    numerator: String,
    denominator: String,
}

impl Fraction {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        require_args("fraction", args, 2)?;
        Ok(Self {
            numerator: text_arg("fraction", args, 0)?,
            denominator: text_arg("fraction", args, 1)?,
        })
    }
}

impl RelationshipFn for Fraction {
    fn evaluate(&mut self, _: &Bundle, _: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let numerator = slot.get(&self.numerator)?;
        ratio(*numerator, slot.get(&self.denominator).copied())
    }
}

/// 현재 슬롯과 무관하게 `(key, subkey, index)`를 번들에서 찾습니다.
pub struct Lookup {
    key: String,
    subkey: String,
    index: String,
    lenient: bool,
}

impl Lookup {
    pub fn new(function: &str, args: &[Arg], lenient: bool) -> Result<Self, AnalysisError> {
        require_args(function, args, 3)?;
        Ok(Self {
            key: text_arg(function, args, 0)?,
            subkey: text_arg(function, args, 1)?,
            index: text_arg(function, args, 2)?,
            lenient,
        })
    }
}

impl RelationshipFn for Lookup {
    fn evaluate(&mut self, bundle: &Bundle, _: &str, _: &str, _: &SlotValues) -> Option<f64> {
        if self.lenient {
            lookup_lenient(bundle, &self.key, &self.subkey, &self.index)
        } else {
            bundle.lookup(&self.key, &self.subkey, &self.index)
        }
    }
}

/// 현재 슬롯 값 / 지정한 `(key, subkey, index)` 값
pub struct FractionOtherIndex {
    numerator: String,
    denominator_index: String,
    denominator_key: String,
    denominator_subkey: String,
}

impl FractionOtherIndex {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        const NAME: &str = "fraction_otherindex";
        require_args(NAME, args, 4)?;
        Ok(Self {
            numerator: text_arg(NAME, args, 0)?,
            denominator_index: text_arg(NAME, args, 1)?,
            denominator_key: text_arg(NAME, args, 2)?,
            denominator_subkey: text_arg(NAME, args, 3)?,
        })
    }
}

impl RelationshipFn for FractionOtherIndex {
    fn evaluate(&mut self, bundle: &Bundle, _: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let numerator = slot.get(&self.numerator)?;
        let denominator = bundle.lookup(
            &self.denominator_key,
            &self.denominator_subkey,
            &self.denominator_index,
        );
        ratio(*numerator, denominator)
    }
}

/// 현재 슬롯 값 / 다른 인덱스에서 같은 키(보조 키 없음)의 값
pub struct FractionSameKey {
    numerator: String,
    denominator_index: String,
}

impl FractionSameKey {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        const NAME: &str = "fraction_otherindex_keyval";
        require_args(NAME, args, 2)?;
        Ok(Self {
            numerator: text_arg(NAME, args, 0)?,
            denominator_index: text_arg(NAME, args, 1)?,
        })
    }
}

impl RelationshipFn for FractionSameKey {
    fn evaluate(&mut self, bundle: &Bundle, key: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let numerator = slot.get(&self.numerator)?;
        ratio(*numerator, bundle.lookup(key, "", &self.denominator_index))
    }
}

/// `(key, subkey)`별 최댓값. 번들이 바뀌어도 유지됩니다.
pub struct ValueMax {
    index: String,
    seen: HashMap<(String, String), f64>,
}

impl ValueMax {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            index: text_arg("value_max", args, 0)?,
            seen: HashMap::new(),
        })
    }
}

impl RelationshipFn for ValueMax {
    fn evaluate(&mut self, _: &Bundle, key: &str, subkey: &str, slot: &SlotValues) -> Option<f64> {
        let current = *slot.get(&self.index)?;
        let max = self
            .seen
            .entry((key.to_owned(), subkey.to_owned()))
            .and_modify(|m| *m = m.max(current))
            .or_insert(current);
        Some(*max)
    }
}
