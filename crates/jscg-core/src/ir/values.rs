use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

/// The narrowest numeric representation a literal or property needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericClass {
    Int32,
    Int64,
    Decimal,
}

/// A numeric literal from a schema keyword, classified by magnitude.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumberValue {
    Int32(i32),
    Int64(i64),
    Decimal(Number),
}

impl NumberValue {
    pub fn from_number(number: &Number) -> Self {
        if let Some(i) = number.as_i64() {
            return Self::from_i64(i);
        }
        if number.is_u64() {
            return NumberValue::Decimal(number.clone());
        }
        match number.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Self::from_i64(f as i64)
            }
            _ => NumberValue::Decimal(number.clone()),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_number().map(Self::from_number)
    }

    pub fn from_i64(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(small) => NumberValue::Int32(small),
            Err(_) => NumberValue::Int64(value),
        }
    }

    pub fn class(&self) -> NumericClass {
        match self {
            NumberValue::Int32(_) => NumericClass::Int32,
            NumberValue::Int64(_) => NumericClass::Int64,
            NumberValue::Decimal(_) => NumericClass::Decimal,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberValue::Int32(v) => Some(i64::from(*v)),
            NumberValue::Int64(v) => Some(*v),
            NumberValue::Decimal(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            NumberValue::Int32(v) => f64::from(*v),
            NumberValue::Int64(v) => *v as f64,
            NumberValue::Decimal(n) => n.as_f64().unwrap_or(f64::NAN),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }

    pub fn is_one(&self) -> bool {
        self.as_f64() == 1.0
    }

    /// Re-type this literal for a property of class `class`. Integral
    /// literals never narrow below what their magnitude needs.
    pub fn retyped(&self, class: NumericClass) -> NumberValue {
        match (class, self.as_i64()) {
            (NumericClass::Int32, Some(v)) => Self::from_i64(v),
            (NumericClass::Int64, Some(v)) => NumberValue::Int64(v),
            (NumericClass::Decimal, Some(v)) => NumberValue::Decimal(Number::from(v)),
            (_, None) => self.clone(),
        }
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberValue::Int32(v) => write!(f, "{v}"),
            NumberValue::Int64(v) => write!(f, "{v}L"),
            NumberValue::Decimal(n) => write!(f, "{n}d"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nv(value: Value) -> NumberValue {
        NumberValue::from_value(&value).unwrap()
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(nv(json!(2147483647)), NumberValue::Int32(i32::MAX));
        assert_eq!(nv(json!(-2147483648)), NumberValue::Int32(i32::MIN));
        assert_eq!(nv(json!(2147483648_i64)), NumberValue::Int64(2147483648));
        assert_eq!(nv(json!(i64::MAX)), NumberValue::Int64(i64::MAX));
        assert_eq!(nv(json!(u64::MAX)).class(), NumericClass::Decimal);
        assert_eq!(nv(json!(1.5)).class(), NumericClass::Decimal);
    }

    #[test]
    fn test_integral_float_is_integer() {
        assert_eq!(nv(json!(10.0)), NumberValue::Int32(10));
        assert_eq!(nv(json!(1e300)).class(), NumericClass::Decimal);
    }

    #[test]
    fn test_predicates() {
        assert!(nv(json!(0)).is_zero());
        assert!(nv(json!(0.0)).is_zero());
        assert!(nv(json!(1)).is_one());
        assert!(!nv(json!(1.5)).is_one());
    }

    #[test]
    fn test_retyped_widens_integers() {
        let small = nv(json!(5));
        assert_eq!(small.retyped(NumericClass::Int64), NumberValue::Int64(5));
        assert_eq!(
            small.retyped(NumericClass::Decimal),
            NumberValue::Decimal(Number::from(5))
        );
        let big = nv(json!(5_000_000_000_i64));
        assert_eq!(big.retyped(NumericClass::Int32), NumberValue::Int64(5_000_000_000));
        let frac = nv(json!(0.5));
        assert_eq!(frac.retyped(NumericClass::Int32), frac);
    }
}
