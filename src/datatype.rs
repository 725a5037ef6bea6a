//! The primitive type lattice and string coercion rules.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Double,
    String,
    DateTime,
    Null,
    Structure,
}

impl DataType {
    /// Parse a datatype name, ignoring case.
    pub fn parse(text: &str) -> Option<DataType> {
        match text.to_ascii_lowercase().as_str() {
            "boolean" => Some(DataType::Boolean),
            "byte" => Some(DataType::Byte),
            "short" => Some(DataType::Short),
            "integer" | "int" => Some(DataType::Integer),
            "long" => Some(DataType::Long),
            "double" => Some(DataType::Double),
            "string" => Some(DataType::String),
            "datetime" => Some(DataType::DateTime),
            "null" => Some(DataType::Null),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Short
                | DataType::Integer
                | DataType::Long
                | DataType::Double
                | DataType::DateTime
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Short | DataType::Integer | DataType::Long
        )
    }

    /// Widening rank of the integral types.
    fn integral_rank(self) -> Option<u8> {
        match self {
            DataType::Byte => Some(0),
            DataType::Short => Some(1),
            DataType::Integer => Some(2),
            DataType::Long | DataType::DateTime => Some(3),
            _ => None,
        }
    }

    /// The type both operands widen to, or `None` when they cannot be
    /// combined.
    pub fn common(one: DataType, two: DataType) -> Option<DataType> {
        use DataType::*;

        if one == Null || two == Null {
            return Some(Null);
        }
        match (one, two) {
            (Double, t) | (t, Double) if t.is_numeric() => Some(Double),
            (Boolean, Boolean) => Some(Boolean),
            (String, String) => Some(String),
            (a, b) => match (a.integral_rank(), b.integral_rank()) {
                (Some(ra), Some(rb)) => Some(match ra.max(rb) {
                    0 => Byte,
                    1 => Short,
                    2 => Integer,
                    _ => Long,
                }),
                _ => None,
            },
        }
    }

    pub fn has_common(one: DataType, two: DataType) -> bool {
        DataType::common(one, two).is_some()
    }

    pub fn can_coerce(self, text: &str) -> bool {
        match self {
            DataType::Boolean => {
                text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false")
            }
            DataType::Byte => decode_integer(text).is_some_and(|v| i8::try_from(v).is_ok()),
            DataType::Short => decode_integer(text).is_some_and(|v| i16::try_from(v).is_ok()),
            DataType::Integer => decode_integer(text).is_some_and(|v| i32::try_from(v).is_ok()),
            DataType::Long | DataType::DateTime => decode_integer(text).is_some(),
            DataType::Double => text.trim().parse::<f64>().is_ok(),
            DataType::Null => text.eq_ignore_ascii_case("null"),
            DataType::String => true,
            DataType::Structure => false,
        }
    }

    /// The narrowest integral type able to hold `text`.
    pub fn smallest_integer(text: &str) -> Option<DataType> {
        [
            DataType::Byte,
            DataType::Short,
            DataType::Integer,
            DataType::Long,
        ]
        .into_iter()
        .find(|dt| dt.can_coerce(text))
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Byte => "BYTE",
            DataType::Short => "SHORT",
            DataType::Integer => "INTEGER",
            DataType::Long => "LONG",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::DateTime => "DATETIME",
            DataType::Null => "NULL",
            DataType::Structure => "STRUCTURE",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode an integer the way numeric literals are written in schema and
/// parameter text: optional sign, then decimal, `0x`/`#` hex or leading-zero
/// octal.
pub fn decode_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    if body.is_empty() || body.starts_with(['-', '+']) {
        return None;
    }

    let (radix, digits) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
        .or_else(|| body.strip_prefix('#'))
    {
        (16, hex)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };
    if digits.is_empty() {
        return None;
    }

    // parse with the sign attached so i64::MIN round trips
    let signed = if negative {
        format!("-{digits}")
    } else {
        digits.to_string()
    };
    i64::from_str_radix(&signed, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_types_widen_to_larger() {
        assert_eq!(DataType::common(DataType::Byte, DataType::Short), Some(DataType::Short));
        assert_eq!(DataType::common(DataType::Integer, DataType::Byte), Some(DataType::Integer));
        assert_eq!(DataType::common(DataType::Long, DataType::Integer), Some(DataType::Long));
        assert_eq!(DataType::common(DataType::DateTime, DataType::Byte), Some(DataType::Long));
        assert_eq!(DataType::common(DataType::DateTime, DataType::DateTime), Some(DataType::Long));
    }

    #[test]
    fn doubles_absorb_numerics_only() {
        assert_eq!(DataType::common(DataType::Double, DataType::Long), Some(DataType::Double));
        assert_eq!(DataType::common(DataType::Short, DataType::Double), Some(DataType::Double));
        assert_eq!(DataType::common(DataType::Double, DataType::String), None);
        assert_eq!(DataType::common(DataType::Boolean, DataType::Double), None);
    }

    #[test]
    fn null_joins_everything() {
        assert_eq!(DataType::common(DataType::Null, DataType::String), Some(DataType::Null));
        assert_eq!(DataType::common(DataType::Structure, DataType::Null), Some(DataType::Null));
        assert_eq!(DataType::common(DataType::Structure, DataType::Structure), None);
    }

    #[test]
    fn strings_and_booleans_stay_apart() {
        assert_eq!(DataType::common(DataType::String, DataType::String), Some(DataType::String));
        assert_eq!(DataType::common(DataType::Boolean, DataType::Boolean), Some(DataType::Boolean));
        assert!(!DataType::has_common(DataType::String, DataType::Long));
        assert!(!DataType::has_common(DataType::Boolean, DataType::Byte));
    }

    #[test]
    fn decode_follows_literal_rules() {
        assert_eq!(decode_integer("42"), Some(42));
        assert_eq!(decode_integer("-42"), Some(-42));
        assert_eq!(decode_integer("0x1F"), Some(31));
        assert_eq!(decode_integer("#ff"), Some(255));
        assert_eq!(decode_integer("010"), Some(8));
        assert_eq!(decode_integer("0"), Some(0));
        assert_eq!(decode_integer("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(decode_integer("12a"), None);
        assert_eq!(decode_integer("--1"), None);
        assert_eq!(decode_integer(""), None);
    }

    #[test]
    fn smallest_integer_picks_narrowest() {
        assert_eq!(DataType::smallest_integer("5"), Some(DataType::Byte));
        assert_eq!(DataType::smallest_integer("300"), Some(DataType::Short));
        assert_eq!(DataType::smallest_integer("70000"), Some(DataType::Integer));
        assert_eq!(DataType::smallest_integer("1486743658000"), Some(DataType::Long));
        assert_eq!(DataType::smallest_integer("1.5"), None);
    }

    #[test]
    fn parse_ignores_case() {
        assert_eq!(DataType::parse("LONG"), Some(DataType::Long));
        assert_eq!(DataType::parse("DateTime"), Some(DataType::DateTime));
        assert_eq!(DataType::parse("struct"), None);
    }
}
