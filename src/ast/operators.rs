use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators of a value comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=` or `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }

    /// True for the operators that need an ordering rather than equality.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte
        )
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoolOp {
    /// `AND` or `&&`
    And,
    /// `OR` or `||`
    Or,
}

impl BoolOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueOp {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl ValueOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ValueOp::Plus => "+",
            ValueOp::Minus => "-",
            ValueOp::Multiply => "*",
            ValueOp::Divide => "/",
            ValueOp::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnaryValueOp {
    /// `+x`
    Normal,
    /// `-x`
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipOp {
    In,
    NotIn,
}

impl MembershipOp {
    pub fn keyword(self) -> &'static str {
        match self {
            MembershipOp::In => "IN",
            MembershipOp::NotIn => "NOT IN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NullTestOp {
    IsNull,
    IsNotNull,
}

impl NullTestOp {
    pub fn keyword(self) -> &'static str {
        match self {
            NullTestOp::IsNull => "IS NULL",
            NullTestOp::IsNotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundsOp {
    Between,
    NotBetween,
}

impl BoundsOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoundsOp::Between => "BETWEEN",
            BoundsOp::NotBetween => "NOT BETWEEN",
        }
    }
}

/// Aggregation functions.
///
/// ```text
/// count(user.sessions) scope user where (user.sessions.startTime > 0)
/// top[10](user.sessions.appVersion)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationOp {
    Sum,
    Count,
    Min,
    Max,
    Unique,
    Top,
}

impl AggregationOp {
    pub fn from_keyword(word: &str) -> Option<AggregationOp> {
        match word.to_ascii_lowercase().as_str() {
            "sum" => Some(AggregationOp::Sum),
            "count" => Some(AggregationOp::Count),
            "min" => Some(AggregationOp::Min),
            "max" => Some(AggregationOp::Max),
            "unique" | "uniques" => Some(AggregationOp::Unique),
            "top" => Some(AggregationOp::Top),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            AggregationOp::Sum => "SUM",
            AggregationOp::Count => "COUNT",
            AggregationOp::Min => "MIN",
            AggregationOp::Max => "MAX",
            AggregationOp::Unique => "UNIQUE",
            AggregationOp::Top => "TOP",
        }
    }
}

/// Duration conversions, folded to milliseconds.
///
/// ```text
/// user.sessions.startTime > NOW - DAYS(90)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionOp {
    Years,
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

impl ConversionOp {
    pub fn from_keyword(word: &str) -> Option<ConversionOp> {
        match word.to_ascii_lowercase().as_str() {
            "years" => Some(ConversionOp::Years),
            "months" => Some(ConversionOp::Months),
            "weeks" => Some(ConversionOp::Weeks),
            "days" => Some(ConversionOp::Days),
            "hours" => Some(ConversionOp::Hours),
            "minutes" => Some(ConversionOp::Minutes),
            "seconds" => Some(ConversionOp::Seconds),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ConversionOp::Years => "YEARS",
            ConversionOp::Months => "MONTHS",
            ConversionOp::Weeks => "WEEKS",
            ConversionOp::Days => "DAYS",
            ConversionOp::Hours => "HOURS",
            ConversionOp::Minutes => "MINUTES",
            ConversionOp::Seconds => "SECONDS",
        }
    }

    /// Milliseconds in one unit. A month is a twelfth of a 365 day year.
    pub fn millis(self) -> f64 {
        match self {
            ConversionOp::Years => 365.0 * MILLIS_PER_DAY,
            ConversionOp::Months => 365.0 / 12.0 * MILLIS_PER_DAY,
            ConversionOp::Weeks => 7.0 * MILLIS_PER_DAY,
            ConversionOp::Days => MILLIS_PER_DAY,
            ConversionOp::Hours => 60.0 * 60.0 * 1000.0,
            ConversionOp::Minutes => 60.0 * 1000.0,
            ConversionOp::Seconds => 1000.0,
        }
    }
}

/// Date-time truncation (quantum) and calendar ordinal functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeOp {
    Year,
    Half,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    SecondOfMinute,
    MinuteOfHour,
    HourOfDay,
    DayOfWeek,
    DayOfMonth,
    DayOfYear,
    WeekOfYear,
    MonthOfYear,
    TheYear,
}

impl TimeOp {
    pub fn from_keyword(word: &str) -> Option<TimeOp> {
        let op = match word.to_ascii_lowercase().as_str() {
            "year" => TimeOp::Year,
            "half" => TimeOp::Half,
            "quarter" => TimeOp::Quarter,
            "month" => TimeOp::Month,
            "week" => TimeOp::Week,
            "day" => TimeOp::Day,
            "hour" => TimeOp::Hour,
            "minute" => TimeOp::Minute,
            "second" => TimeOp::Second,
            "secondofminute" => TimeOp::SecondOfMinute,
            "minuteofhour" => TimeOp::MinuteOfHour,
            "hourofday" => TimeOp::HourOfDay,
            "dayofweek" => TimeOp::DayOfWeek,
            "dayofmonth" => TimeOp::DayOfMonth,
            "dayofyear" => TimeOp::DayOfYear,
            "weekofyear" => TimeOp::WeekOfYear,
            "monthofyear" => TimeOp::MonthOfYear,
            "theyear" => TimeOp::TheYear,
            _ => return None,
        };
        Some(op)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            TimeOp::Year => "YEAR",
            TimeOp::Half => "HALF",
            TimeOp::Quarter => "QUARTER",
            TimeOp::Month => "MONTH",
            TimeOp::Week => "WEEK",
            TimeOp::Day => "DAY",
            TimeOp::Hour => "HOUR",
            TimeOp::Minute => "MINUTE",
            TimeOp::Second => "SECOND",
            TimeOp::SecondOfMinute => "SECONDOFMINUTE",
            TimeOp::MinuteOfHour => "MINUTEOFHOUR",
            TimeOp::HourOfDay => "HOUROFDAY",
            TimeOp::DayOfWeek => "DAYOFWEEK",
            TimeOp::DayOfMonth => "DAYOFMONTH",
            TimeOp::DayOfYear => "DAYOFYEAR",
            TimeOp::WeekOfYear => "WEEKOFYEAR",
            TimeOp::MonthOfYear => "MONTHOFYEAR",
            TimeOp::TheYear => "THEYEAR",
        }
    }

    /// Ordinals yield a calendar number; quantums yield a truncated time.
    pub fn is_ordinal(self) -> bool {
        matches!(
            self,
            TimeOp::SecondOfMinute
                | TimeOp::MinuteOfHour
                | TimeOp::HourOfDay
                | TimeOp::DayOfWeek
                | TimeOp::DayOfMonth
                | TimeOp::DayOfYear
                | TimeOp::WeekOfYear
                | TimeOp::MonthOfYear
                | TimeOp::TheYear
        )
    }
}

/// Funnel step boundary markers: `START OF path`, `END OF path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryOp {
    Start,
    End,
}

impl BoundaryOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoundaryOp::Start => "START",
            BoundaryOp::End => "END",
        }
    }
}

macro_rules! display_via {
    ($ty:ty, $method:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.$method())
            }
        }
    };
}

display_via!(CompareOp, symbol);
display_via!(BoolOp, keyword);
display_via!(ValueOp, symbol);
display_via!(MembershipOp, keyword);
display_via!(NullTestOp, keyword);
display_via!(BoundsOp, keyword);
display_via!(AggregationOp, keyword);
display_via!(ConversionOp, keyword);
display_via!(TimeOp, keyword);
display_via!(BoundaryOp, keyword);
