//! 번들 -- 한 시간 구간의 `key → subkey → index → value` 묶음
//!
//! 관계 분석기는 같은 시간 구간의 튜플을 번들에 모은 뒤, 구간이 바뀔 때
//! 슬롯마다 관계 함수를 평가합니다. 슬롯은 처음 나타난 순서를 유지합니다.

use std::collections::HashMap;

use timebin_core::types::Tuple;

/// 한 슬롯의 `index → value`
pub type SlotValues = HashMap<String, f64>;

/// `(key, subkey)` 슬롯
#[derive(Debug, Clone, PartialEq)]
pub struct SlotEntry {
    pub key: String,
    pub subkey: String,
    pub values: SlotValues,
}

/// 한 시간 구간의 번들
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    time_bin: i64,
    slots: Vec<SlotEntry>,
    positions: HashMap<String, HashMap<String, usize>>,
}

impl Bundle {
    pub fn new(time_bin: i64) -> Self {
        Self {
            time_bin,
            ..Self::default()
        }
    }

    pub fn time_bin(&self) -> i64 {
        self.time_bin
    }

    /// 값을 기록합니다. 같은 `(key, subkey, index)`가 이미 있으면 덮어씁니다.
    pub fn insert(&mut self, key: &str, subkey: &str, index: &str, value: f64) {
        let slot = match self.position(key, subkey) {
            Some(pos) => &mut self.slots[pos],
            None => {
                let pos = self.slots.len();
                self.positions
                    .entry(key.to_owned())
                    .or_default()
                    .insert(subkey.to_owned(), pos);
                self.slots.push(SlotEntry {
                    key: key.to_owned(),
                    subkey: subkey.to_owned(),
                    values: SlotValues::new(),
                });
                &mut self.slots[pos]
            }
        };
        slot.values.insert(index.to_owned(), value);
    }

    /// 튜플 하나를 기록합니다.
    pub fn insert_tuple(&mut self, tuple: &Tuple) {
        self.insert(&tuple.key, &tuple.subkey, &tuple.index, tuple.value);
    }

    pub fn slot(&self, key: &str, subkey: &str) -> Option<&SlotValues> {
        self.position(key, subkey).map(|pos| &self.slots[pos].values)
    }

    /// `bundle[key][subkey][index]`. 어느 단계든 없으면 `None`입니다.
    pub fn lookup(&self, key: &str, subkey: &str, index: &str) -> Option<f64> {
        self.slot(key, subkey)?.get(index).copied()
    }

    /// 슬롯을 처음 나타난 순서로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &SlotEntry> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, key: &str, subkey: &str) -> Option<usize> {
        self.positions.get(key)?.get(subkey).copied()
    }
}
