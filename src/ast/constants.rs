//! Literal values and the arithmetic used to fold them.

use crate::ast::operators::{CompareOp, ValueOp};
use crate::datatype::{DataType, decode_integer};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Null,
}

impl Constant {
    /// Integer constant of the narrowest type holding `value`.
    pub fn integer(value: i64) -> Constant {
        if let Ok(v) = i8::try_from(value) {
            Constant::Byte(v)
        } else if let Ok(v) = i16::try_from(value) {
            Constant::Short(v)
        } else if let Ok(v) = i32::try_from(value) {
            Constant::Integer(v)
        } else {
            Constant::Long(value)
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Constant::Boolean(_) => DataType::Boolean,
            Constant::Byte(_) => DataType::Byte,
            Constant::Short(_) => DataType::Short,
            Constant::Integer(_) => DataType::Integer,
            Constant::Long(_) => DataType::Long,
            Constant::Double(_) => DataType::Double,
            Constant::String(_) => DataType::String,
            Constant::Null => DataType::Null,
        }
    }

    /// Wire tag of the constant node.
    pub fn tag(&self) -> &'static str {
        match self {
            Constant::Boolean(_) => "BOOL_C",
            Constant::Byte(_) => "BYTE_C",
            Constant::Short(_) => "SHORT_C",
            Constant::Integer(_) => "INTEGER_C",
            Constant::Long(_) => "LONG_C",
            Constant::Double(_) => "DOUBLE_C",
            Constant::String(_) => "STRING_C",
            Constant::Null => "NULL_C",
        }
    }

    pub fn explain_name(&self) -> &'static str {
        match self {
            Constant::Boolean(_) => "BooleanConstant",
            Constant::Byte(_) => "ByteConstant",
            Constant::Short(_) => "ShortConstant",
            Constant::Integer(_) => "IntegerConstant",
            Constant::Long(_) => "LongConstant",
            Constant::Double(_) => "DoubleConstant",
            Constant::String(_) => "StringConstant",
            Constant::Null => "NullConstant",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Byte(v) => Some(i64::from(*v)),
            Constant::Short(v) => Some(i64::from(*v)),
            Constant::Integer(v) => Some(i64::from(*v)),
            Constant::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Constant::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to `dtype`, with string decoding for numeric targets.
    pub fn cast_to(&self, dtype: DataType) -> Result<Constant, String> {
        if self.is_null() {
            return Ok(Constant::Null);
        }
        match dtype {
            DataType::Boolean => match self {
                Constant::Boolean(b) => Ok(Constant::Boolean(*b)),
                Constant::String(s) if DataType::Boolean.can_coerce(s) => {
                    Ok(Constant::Boolean(s.eq_ignore_ascii_case("true")))
                }
                other => other
                    .as_i64()
                    .map(|v| Constant::Boolean(v != 0))
                    .ok_or_else(|| format!("'{}' is not a boolean", other.motif())),
            },
            DataType::Byte | DataType::Short | DataType::Integer | DataType::Long | DataType::DateTime => {
                let value = match self {
                    Constant::String(s) => decode_integer(s)
                        .or_else(|| s.trim().parse::<f64>().ok().map(|d| d as i64))
                        .ok_or_else(|| format!("'{s}' is not a number"))?,
                    Constant::Double(d) => *d as i64,
                    Constant::Boolean(b) => i64::from(*b),
                    other => other
                        .as_i64()
                        .ok_or_else(|| format!("'{}' is not a number", other.motif()))?,
                };
                Ok(match dtype {
                    DataType::Byte => Constant::Byte(value as i8),
                    DataType::Short => Constant::Short(value as i16),
                    DataType::Integer => Constant::Integer(value as i32),
                    _ => Constant::Long(value),
                })
            }
            DataType::Double => match self {
                Constant::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Constant::Double)
                    .map_err(|_| format!("'{s}' is not a number")),
                Constant::Boolean(b) => Ok(Constant::Double(if *b { 1.0 } else { 0.0 })),
                other => other
                    .as_f64()
                    .map(Constant::Double)
                    .ok_or_else(|| format!("'{}' is not a number", other.motif())),
            },
            DataType::String => Ok(Constant::String(match self {
                Constant::String(s) => s.clone(),
                Constant::Double(d) => format_double(*d),
                Constant::Boolean(b) => b.to_string(),
                other => other.as_i64().map(|v| v.to_string()).unwrap_or_default(),
            })),
            DataType::Null => Ok(Constant::Null),
            DataType::Structure => Err("structures are not values".to_string()),
        }
    }

    /// Equality across numeric widths; used by membership folding.
    pub fn loosely_equals(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Null, Constant::Null) => true,
            (Constant::Null, _) | (_, Constant::Null) => false,
            (a, b) => a.compare(b) == Some(Ordering::Equal),
        }
    }

    /// Ordering of two non-null constants of compatible types.
    pub fn compare(&self, other: &Constant) -> Option<Ordering> {
        match (self, other) {
            (Constant::Boolean(a), Constant::Boolean(b)) => Some(a.cmp(b)),
            (Constant::String(a), Constant::String(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    /// Fold a comparison of two constants.
    pub fn compare_with(&self, op: CompareOp, other: &Constant) -> Result<bool, String> {
        if self.is_null() || other.is_null() {
            return match op {
                CompareOp::Eq => Ok(self.is_null() && other.is_null()),
                CompareOp::Neq => Ok(!(self.is_null() && other.is_null())),
                _ => Err(format!("can't perform {op} on nulls")),
            };
        }
        let ordering = self.compare(other).ok_or_else(|| {
            format!(
                "can't compare '{}' with '{}'",
                self.motif(),
                other.motif()
            )
        })?;
        Ok(match op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Neq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        })
    }

    /// Fold an arithmetic operation. Integer results narrow to the smallest
    /// type; anything involving a double stays double.
    pub fn arithmetic(&self, op: ValueOp, other: &Constant) -> Result<Constant, String> {
        if self.is_null() || other.is_null() {
            return Ok(Constant::Null);
        }
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            let result = match op {
                ValueOp::Plus => a.checked_add(b),
                ValueOp::Minus => a.checked_sub(b),
                ValueOp::Multiply => a.checked_mul(b),
                ValueOp::Divide if b == 0 => return Err("division by zero".to_string()),
                ValueOp::Divide => a.checked_div(b),
                ValueOp::Modulo if b == 0 => return Err("division by zero".to_string()),
                ValueOp::Modulo => a.checked_rem(b),
            };
            return result
                .map(Constant::integer)
                .ok_or_else(|| format!("integer overflow in {} {op} {}", self.motif(), other.motif()));
        }

        let (a, b) = match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(format!(
                    "can't apply {op} to '{}' and '{}'",
                    self.motif(),
                    other.motif()
                ));
            }
        };
        if matches!(op, ValueOp::Divide | ValueOp::Modulo) && b == 0.0 {
            return Err("division by zero".to_string());
        }

        // exact decimal arithmetic where both sides fit, so 0.1 + 0.2 folds to 0.3
        if let (Some(ad), Some(bd)) = (Decimal::from_f64(a), Decimal::from_f64(b)) {
            let rd = match op {
                ValueOp::Plus => ad.checked_add(bd),
                ValueOp::Minus => ad.checked_sub(bd),
                ValueOp::Multiply => ad.checked_mul(bd),
                ValueOp::Divide => ad.checked_div(bd),
                ValueOp::Modulo => ad.checked_rem(bd),
            };
            if let Some(r) = rd.and_then(|r| r.to_f64()) {
                return Ok(Constant::Double(r));
            }
        }
        Ok(Constant::Double(match op {
            ValueOp::Plus => a + b,
            ValueOp::Minus => a - b,
            ValueOp::Multiply => a * b,
            ValueOp::Divide => a / b,
            ValueOp::Modulo => a % b,
        }))
    }

    pub fn negate(&self) -> Result<Constant, String> {
        match self {
            Constant::Null => Ok(Constant::Null),
            Constant::Double(d) => Ok(Constant::Double(-d)),
            other => other
                .as_i64()
                .and_then(|v| v.checked_neg())
                .map(Constant::integer)
                .ok_or_else(|| format!("can't negate '{}'", other.motif())),
        }
    }

    /// Canonical source form.
    ///
    /// Integers wider than their value requires are written as a cast so that
    /// reparsing yields the same constant type.
    pub fn motif(&self) -> String {
        match self {
            Constant::Boolean(b) => b.to_string(),
            Constant::Null => "NULL".to_string(),
            Constant::String(s) => quote_string(s),
            Constant::Double(d) => format_double(*d),
            other => {
                let value = other.as_i64().unwrap_or_default();
                if Constant::integer(value).dtype() == other.dtype() {
                    value.to_string()
                } else {
                    format!("CAST({value} AS {})", other.dtype())
                }
            }
        }
    }

    /// Value text used by explain output.
    pub fn value_text(&self) -> String {
        match self {
            Constant::String(s) => s.clone(),
            Constant::Double(d) => format_double(*d),
            Constant::Null => "null".to_string(),
            Constant::Boolean(b) => b.to_string(),
            other => other.as_i64().unwrap_or_default().to_string(),
        }
    }
}

/// Single-quoted string literal with `''` escaping.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Doubles always carry a fraction so they reparse as doubles.
pub fn format_double(d: f64) -> String {
    let text = d.to_string();
    if text.contains(['.', 'e', 'E', 'N', 'n']) {
        text
    } else {
        format!("{text}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_narrow() {
        assert_eq!(Constant::integer(5), Constant::Byte(5));
        assert_eq!(Constant::integer(-129), Constant::Short(-129));
        assert_eq!(Constant::integer(1 << 20), Constant::Integer(1 << 20));
        assert_eq!(Constant::integer(1 << 40), Constant::Long(1 << 40));
    }

    #[test]
    fn modulo_folds() {
        let r = Constant::integer(5999)
            .arithmetic(ValueOp::Modulo, &Constant::integer(34))
            .unwrap();
        assert_eq!(r, Constant::Byte(15));
        let r = Constant::integer(5984)
            .arithmetic(ValueOp::Modulo, &Constant::integer(34))
            .unwrap();
        assert_eq!(r, Constant::Byte(0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(Constant::integer(1).arithmetic(ValueOp::Divide, &Constant::integer(0)).is_err());
        assert!(Constant::Double(1.0).arithmetic(ValueOp::Modulo, &Constant::integer(0)).is_err());
    }

    #[test]
    fn mixed_arithmetic_is_exact() {
        let r = Constant::Double(0.1).arithmetic(ValueOp::Plus, &Constant::Double(0.2)).unwrap();
        assert_eq!(r, Constant::Double(0.3));
        let r = Constant::integer(2).arithmetic(ValueOp::Multiply, &Constant::Double(1.5)).unwrap();
        assert_eq!(r, Constant::Double(3.0));
    }

    #[test]
    fn comparisons_cross_numeric_widths() {
        assert!(Constant::Byte(5).compare_with(CompareOp::Eq, &Constant::Long(5)).unwrap());
        assert!(Constant::Double(5.5).compare_with(CompareOp::Gt, &Constant::Short(5)).unwrap());
        assert!(Constant::Null.compare_with(CompareOp::Eq, &Constant::Null).unwrap());
        assert!(Constant::Null.compare_with(CompareOp::Neq, &Constant::Byte(1)).unwrap());
        assert_eq!(
            Constant::Null.compare_with(CompareOp::Lt, &Constant::Byte(1)),
            Err("can't perform < on nulls".to_string())
        );
    }

    #[test]
    fn motif_forms_reparse_to_same_type() {
        assert_eq!(Constant::Byte(5).motif(), "5");
        assert_eq!(Constant::Long(5).motif(), "CAST(5 AS LONG)");
        assert_eq!(Constant::Long(1486743658000).motif(), "1486743658000");
        assert_eq!(Constant::Double(2.0).motif(), "2.0");
        assert_eq!(Constant::String("it's".into()).motif(), "'it''s'");
        assert_eq!(Constant::Null.motif(), "NULL");
    }

    #[test]
    fn casts_decode_strings() {
        assert_eq!(
            Constant::String("1047".into()).cast_to(DataType::Long),
            Ok(Constant::Long(1047))
        );
        assert_eq!(
            Constant::Byte(3).cast_to(DataType::Double),
            Ok(Constant::Double(3.0))
        );
        assert_eq!(
            Constant::Long(12).cast_to(DataType::String),
            Ok(Constant::String("12".into()))
        );
        assert!(Constant::String("abc".into()).cast_to(DataType::Integer).is_err());
    }
}
