//! 도메인 타입 -- 행, 필드, 스키마, 튜플
//!
//! 모든 스테이지가 주고받는 데이터 단위를 정의합니다.
//!
//! - [`Row`]: 입력 레코드 하나 (필드의 순서 있는 나열)
//! - [`Schema`]: 컬럼 이름 → 위치 매핑
//! - [`Tuple`]: 스테이지 간 전송 단위 `(time_bin, index, key, subkey, value)`

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 기본 시간 구간 크기 (초)
pub const DEFAULT_BIN_SIZE: u32 = 60;

/// 구간 계산에 쓸 수 있는 시간 값의 최대 절댓값 (2^53, f64가 정수를 정확히 표현하는 범위)
pub const MAX_TIME: f64 = 9_007_199_254_740_992.0;

/// 시간 값을 구간 시작값으로 내림합니다.
///
/// 소수점 이하는 버리고(0 방향 절삭), 음수 시간에도 구간 경계가
/// 항상 `bin_size`의 배수가 되도록 유클리드 나머지를 사용합니다.
/// `NaN`, 무한대, 절댓값이 [`MAX_TIME`]보다 큰 값은 `None`입니다.
///
/// ```
/// use timebin_core::types::time_bin;
///
/// assert_eq!(time_bin(10.5, 60), Some(0));
/// assert_eq!(time_bin(61.0, 60), Some(60));
/// assert_eq!(time_bin(-1.0, 60), Some(-60));
/// assert_eq!(time_bin(f64::NEG_INFINITY, 60), None);
/// ```
pub fn time_bin(t: f64, bin_size: u32) -> Option<i64> {
    if !t.is_finite() || t.abs() > MAX_TIME {
        return None;
    }
    let t = t.trunc() as i64;
    let bin = i64::from(bin_size.max(1));
    Some(t - t.rem_euclid(bin))
}

/// 입력 행의 필드 값
///
/// 외부 스트림에서 읽은 값은 대부분 `Text`이며, 숫자가 필요한 곳에서
/// [`Field::as_f64`]로 해석합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Int(i64),
    Float(f64),
    Text(String),
    /// 값 없음 (빈 필드, 또는 관계 분석의 "no data" 표시)
    Empty,
}

impl Field {
    /// 필드를 문자열로 봅니다. 숫자는 표시 형식으로 변환됩니다.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Float(x) => Cow::Owned(format_float(*x)),
            Self::Empty => Cow::Borrowed(""),
        }
    }

    /// 필드를 숫자로 해석합니다. 해석할 수 없으면 `None`입니다.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Empty => None,
        }
    }

    /// 필드를 정수로 해석합니다. 정수 문자열만 허용합니다.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(x) if x.fract() == 0.0 => Some(*x as i64),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// 빈 필드인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Field {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Field {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Field {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<Option<f64>> for Field {
    fn from(x: Option<f64>) -> Self {
        x.map_or(Self::Empty, Self::Float)
    }
}

/// 실수를 표시합니다. 정수값은 `42.0`처럼 소수점 한 자리를 붙입니다.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        x.to_string()
    }
}

/// 입력 레코드 하나
///
/// 읽은 뒤에는 변경되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// 위치의 필드. 범위를 벗어나면 `None`입니다.
    pub fn get(&self, pos: usize) -> Option<&Field> {
        self.fields.get(pos)
    }

    /// 위치의 필드를 문자열로 가져옵니다. 범위를 벗어나면 빈 문자열입니다.
    pub fn text(&self, pos: usize) -> Cow<'_, str> {
        self.fields
            .get(pos)
            .map_or(Cow::Borrowed(""), Field::as_str)
    }

    /// 위치의 필드를 숫자로 가져옵니다.
    pub fn number(&self, pos: usize) -> Option<f64> {
        self.fields.get(pos).and_then(Field::as_f64)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

impl From<Vec<Field>> for Row {
    fn from(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

impl FromIterator<Field> for Row {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// 여러 타입의 값으로 [`Row`]를 만듭니다.
///
/// ```
/// use timebin_core::row;
///
/// let row = row![10.5, "valueA", 40];
/// assert_eq!(row.len(), 3);
/// assert_eq!(row.text(1), "valueA");
/// ```
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::types::Row::new(vec![$($crate::types::Field::from($value)),*])
    };
}

/// 컬럼 이름 → 위치 매핑
///
/// 입력 스트림 헤더에서 만들어지며, 인자 지정자(`col(name)`)를 해석할 때 사용합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// 컬럼 이름의 위치를 찾습니다.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 위치의 컬럼 이름
    pub fn name(&self, pos: usize) -> Option<&str> {
        self.columns.get(pos).map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// 튜플 스트림의 컬럼 이름
pub const TUPLE_COLUMNS: [&str; 5] = ["timebin", "index", "key", "subkey", "value"];

/// 스테이지 간 전송 단위
///
/// Feature Counter와 Aggregator의 출력, Aggregator와 Relationship Analyzer의 입력입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// 시간 구간 시작값
    pub time_bin: i64,
    /// 특성 채널 이름
    pub index: String,
    /// 주 그룹 키
    pub key: String,
    /// 보조 키 (사용하지 않으면 빈 문자열)
    pub subkey: String,
    /// 누적 값
    pub value: f64,
}

impl Tuple {
    pub fn new(
        time_bin: i64,
        index: impl Into<String>,
        key: impl Into<String>,
        subkey: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            time_bin,
            index: index.into(),
            key: key.into(),
            subkey: subkey.into(),
            value,
        }
    }

    /// 5개 필드로 된 행에서 튜플을 읽습니다.
    ///
    /// 시간 구간과 값이 숫자가 아니거나 필드가 부족하면 사유 문자열을 반환합니다.
    pub fn from_row(row: &Row) -> Result<Self, String> {
        if row.len() < 5 {
            return Err(format!("expected 5 fields, got {}", row.len()));
        }
        let time_bin = row
            .number(0)
            .filter(|t| t.is_finite() && t.abs() <= MAX_TIME)
            .ok_or_else(|| format!("non-numeric time bin '{}'", row.text(0)))?;
        let value = row
            .number(4)
            .ok_or_else(|| format!("non-numeric value '{}'", row.text(4)))?;
        Ok(Self {
            time_bin: time_bin.trunc() as i64,
            index: row.text(1).into_owned(),
            key: row.text(2).into_owned(),
            subkey: row.text(3).into_owned(),
            value,
        })
    }

    /// 튜플을 출력 행으로 변환합니다.
    pub fn into_row(self) -> Row {
        Row::new(vec![
            Field::Int(self.time_bin),
            Field::Text(self.index),
            Field::Text(self.key),
            Field::Text(self.subkey),
            Field::Float(self.value),
        ])
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.time_bin,
            self.index,
            self.key,
            self.subkey,
            format_float(self.value)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_bin_floors_to_bin_start() {
        assert_eq!(time_bin(0.0, 60), Some(0));
        assert_eq!(time_bin(59.9, 60), Some(0));
        assert_eq!(time_bin(60.0, 60), Some(60));
        assert_eq!(time_bin(125.0, 60), Some(120));
        assert_eq!(time_bin(13.0, 10), Some(10));
    }

    #[test]
    fn time_bin_negative_times_use_floor_semantics() {
        assert_eq!(time_bin(-1.0, 60), Some(-60));
        assert_eq!(time_bin(-60.0, 60), Some(-60));
        assert_eq!(time_bin(-61.0, 60), Some(-120));
    }

    #[test]
    fn time_bin_rejects_non_finite_and_out_of_range_times() {
        assert_eq!(time_bin(f64::NAN, 60), None);
        assert_eq!(time_bin(f64::INFINITY, 60), None);
        assert_eq!(time_bin(f64::NEG_INFINITY, 60), None);
        assert_eq!(time_bin(1e300, 60), None);
        assert_eq!(time_bin(-1e300, 60), None);
        assert_eq!(time_bin(-MAX_TIME, 60), Some(-9_007_199_254_741_020));
    }

    #[test]
    fn parsed_non_finite_text_has_no_time_bin() {
        let row = row!["-inf", "inf", "nan", "NaN"];
        for pos in 0..row.len() {
            let t = row.number(pos).expect("f64 parses these spellings");
            assert_eq!(time_bin(t, 60), None, "field {pos}");
        }
    }

    #[test]
    fn time_bin_zero_size_is_clamped() {
        assert_eq!(time_bin(17.0, 0), Some(17));
    }

    #[test]
    fn field_numeric_parsing() {
        assert_eq!(Field::from("42").as_f64(), Some(42.0));
        assert_eq!(Field::from(" 1.5 ").as_f64(), Some(1.5));
        assert_eq!(Field::from("abc").as_f64(), None);
        assert_eq!(Field::Empty.as_f64(), None);
        assert_eq!(Field::from(3).as_i64(), Some(3));
        assert_eq!(Field::from(3.5).as_i64(), None);
        assert_eq!(Field::from("7").as_i64(), Some(7));
    }

    #[test]
    fn field_display() {
        assert_eq!(Field::from(2.0).to_string(), "2.0");
        assert_eq!(Field::from(0.25).to_string(), "0.25");
        assert_eq!(Field::from(7).to_string(), "7");
        assert_eq!(Field::Empty.to_string(), "");
    }

    #[test]
    fn field_emptiness() {
        assert!(Field::Empty.is_empty());
        assert!(Field::from("").is_empty());
        assert!(!Field::from(0).is_empty());
    }

    #[test]
    fn row_macro_and_accessors() {
        let row = row![10.5, "valueA", 40];
        assert_eq!(row.len(), 3);
        assert_eq!(row.number(0), Some(10.5));
        assert_eq!(row.text(1), "valueA");
        assert_eq!(row.text(9), "");
        assert!(row.get(9).is_none());
    }

    #[test]
    fn schema_lookup() {
        let schema = Schema::new(["time", "qname", "srcip"]);
        assert_eq!(schema.position("qname"), Some(1));
        assert_eq!(schema.position("missing"), None);
        assert_eq!(schema.name(2), Some("srcip"));
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn tuple_from_row() {
        let row = row!["60", "i", "k", "s", "32"];
        let tuple = Tuple::from_row(&row).expect("valid tuple row");
        assert_eq!(tuple, Tuple::new(60, "i", "k", "s", 32.0));
    }

    #[test]
    fn tuple_from_short_row_is_rejected() {
        let err = Tuple::from_row(&row!["60", "i"]).expect_err("too short");
        assert!(err.contains("expected 5 fields"));
    }

    #[test]
    fn tuple_from_row_rejects_non_numeric_value() {
        let err = Tuple::from_row(&row!["60", "i", "k", "s", "many"]).expect_err("bad value");
        assert!(err.contains("many"));
    }

    #[test]
    fn tuple_from_row_rejects_non_finite_time_bin() {
        let err = Tuple::from_row(&row!["inf", "i", "k", "s", "1"]).expect_err("infinite bin");
        assert!(err.contains("inf"));
        assert!(Tuple::from_row(&row!["nan", "i", "k", "s", "1"]).is_err());
    }

    #[test]
    fn tuple_display_is_tab_separated() {
        let tuple = Tuple::new(120, "i", "k", "", 100.0);
        assert_eq!(tuple.to_string(), "120\ti\tk\t\t100.0");
    }
}
