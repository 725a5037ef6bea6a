use crate::ast::bindings::Binding;
use crate::ast::constants::Constant;
use crate::ast::operators::{
    AggregationOp, BoolOp, BoundaryOp, BoundsOp, CompareOp, ConversionOp, MembershipOp, NullTestOp,
    TimeOp, UnaryValueOp, ValueOp,
};
use crate::ast::statements::ParameterDefinition;
use crate::datatype::DataType;
use crate::error::Location;
use crate::path::Path;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Syntax tree node of a value or boolean expression.
///
/// Each variant wraps a node struct carrying its own location. The parser
/// builds the unbound shape; `bind` fills in bindings, definitions and
/// defaults, and `optimize` may replace a whole subtree with a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Data access
    /// Dotted path with an optional map key
    ///
    /// # Examples
    /// ```text
    /// user.sessions.startTime
    /// user.sessions.parameters['campaign']
    /// f.paths.steps.time
    /// ```
    #[serde(rename = "PATH")]
    Path(PathAccessor),

    /// Query, funnel or segment parameter
    ///
    /// # Example
    /// ```text
    /// $limit
    /// ```
    #[serde(rename = "PARAMETER")]
    Parameter(ParameterAccessor),

    // Boolean expressions
    /// `a == b`, `a < b`, ...
    #[serde(rename = "VAL_COMP_BE")]
    Comparison(ValueComparison),

    /// `a AND b`, `a || b`
    #[serde(rename = "BINARY_BE")]
    BinaryBoolean(BinaryBoolean),

    /// `NOT a`, `!a`
    #[serde(rename = "UNARY_BE")]
    Not(UnaryBoolean),

    /// A boolean valued expression in predicate position
    ///
    /// # Example
    /// ```text
    /// where f.paths.isComplete
    /// ```
    #[serde(rename = "VAL_BE")]
    BooleanValue(BooleanValue),

    /// `x IN (1, 2, 3)`
    #[serde(rename = "MEM_TST_EX_BE")]
    ExplicitMembership(ExplicitMembership),

    /// `x IN user.sessions.tags`, `x NOT IN $ids`
    #[serde(rename = "MEM_TST_VEC_BE")]
    VectorMembership(VectorMembership),

    /// `x IS NULL`, `x IS NOT NULL`
    #[serde(rename = "NULL_TST_BE")]
    NullTest(NullTest),

    /// `x BETWEEN lo AND hi`
    #[serde(rename = "BOUNDS_TST_BE")]
    Bounds(BoundsTest),

    // Value expressions
    /// `a + b`, `a % b`, ...
    #[serde(rename = "BINARY_VE")]
    BinaryValue(BinaryValue),

    /// `-a`, `+a`
    #[serde(rename = "UNARY_VE")]
    UnaryValue(UnaryValue),

    /// `CAST(x AS long)`
    #[serde(rename = "CAST_VE")]
    Cast(Cast),

    /// `NOW`
    #[serde(rename = "NOW_VE")]
    Now(Now),

    /// `DAYS(30)`, `MINUTES(2)`
    #[serde(rename = "TIME_VAL_VE")]
    Conversion(DateTimeConversion),

    /// `DAY(user.sessions.startTime)`, `DAYOFWEEK(x, 'UTC')`
    #[serde(rename = "TIME_QUA_VE")]
    Quantum(DateTimeQuantum),

    /// `count(user.sessions) scope user where user.sessions.startTime > 0`
    #[serde(rename = "AGG_VE")]
    Aggregation(Aggregation),

    /// Built-in function call
    ///
    /// # Examples
    /// ```text
    /// size(user.sessions)
    /// split(user.sessions.events.id, 0, 10, 20)
    /// lastPathIsComplete(f)
    /// ```
    #[serde(rename = "FUNCTION")]
    Function(FunctionCall),

    /// `START OF user.sessions`, `END OF user.sessions` in funnel steps
    #[serde(rename = "BOUNDARY_BOOLEAN")]
    Boundary(BoundaryBoolean),

    /// Literal, tagged by its own type on the wire
    #[serde(untagged)]
    Constant(ConstantExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathAccessor {
    pub components: Vec<String>,
    #[serde(default)]
    pub key: Option<Box<Expr>>,
    #[serde(default)]
    pub binding: Option<Binding>,
    #[serde(default)]
    pub location: Location,
}

impl PathAccessor {
    pub fn new(components: Vec<String>, location: Location) -> Self {
        PathAccessor {
            components,
            key: None,
            binding: None,
            location,
        }
    }

    pub fn full_path(&self) -> String {
        self.components.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAccessor {
    pub name: String,
    #[serde(default)]
    pub definition: Option<ParameterDefinition>,
    /// Root path of the statement the parameter belongs to.
    #[serde(default)]
    pub eval_point: Option<Path>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueComparison {
    pub op: CompareOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryBoolean {
    pub op: BoolOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryBoolean {
    pub expr: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanValue {
    pub expr: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitMembership {
    pub op: MembershipOp,
    pub left: Box<Expr>,
    pub members: Vec<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMembership {
    pub op: MembershipOp,
    pub left: Box<Expr>,
    pub vector: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullTest {
    pub op: NullTestOp,
    pub expr: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsTest {
    pub op: BoundsOp,
    pub expr: Box<Expr>,
    pub lower: Box<Expr>,
    pub upper: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryValue {
    pub op: ValueOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryValue {
    pub op: UnaryValueOp,
    pub expr: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub expr: Box<Expr>,
    pub dtype: DataType,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Now {
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeConversion {
    pub op: ConversionOp,
    pub expr: Box<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeQuantum {
    pub op: TimeOp,
    pub expr: Box<Expr>,
    /// Written timezone; bind fills in the configured default.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub op: AggregationOp,
    /// `n` of `top[n]`.
    #[serde(default)]
    pub size: Option<u32>,
    pub expr: Box<Expr>,
    #[serde(default)]
    pub scope: Option<Box<Expr>>,
    #[serde(default)]
    pub quanta: Option<Box<Expr>>,
    #[serde(default)]
    pub filter: Option<Box<Expr>>,
    #[serde(default)]
    pub location: Location,
}

/// The built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionKind {
    Size,
    DateTime,
    Frequency,
    Enum,
    Split,
    LastPathIsComplete,
    LastPathStepTime,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 7] = [
        FunctionKind::Size,
        FunctionKind::DateTime,
        FunctionKind::Frequency,
        FunctionKind::Enum,
        FunctionKind::Split,
        FunctionKind::LastPathIsComplete,
        FunctionKind::LastPathStepTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::Size => "size",
            FunctionKind::DateTime => "datetime",
            FunctionKind::Frequency => "frequency",
            FunctionKind::Enum => "enum",
            FunctionKind::Split => "split",
            FunctionKind::LastPathIsComplete => "lastPathIsComplete",
            FunctionKind::LastPathStepTime => "lastPathStepTime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Resolved during bind.
    #[serde(default)]
    pub function: Option<FunctionKind>,
    pub args: Vec<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryBoolean {
    pub op: BoundaryOp,
    pub target: PathAccessor,
    #[serde(default)]
    pub location: Location,
}

/// A literal with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantExpr {
    pub value: Constant,
    pub location: Location,
}

impl Serialize for ConstantExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            value: serde_json::Value,
            location: &'a Location,
        }

        let value = match &self.value {
            Constant::Boolean(b) => serde_json::Value::from(*b),
            Constant::Double(d) => serde_json::Value::from(*d),
            Constant::String(s) => serde_json::Value::from(s.as_str()),
            Constant::Null => serde_json::Value::Null,
            other => serde_json::Value::from(other.as_i64().unwrap_or_default()),
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            self.value.tag(),
            &Body {
                value,
                location: &self.location,
            },
        )?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConstantExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            value: serde_json::Value,
            #[serde(default)]
            location: Location,
        }

        let tagged = BTreeMap::<String, Body>::deserialize(deserializer)?;
        let mut entries = tagged.into_iter();
        let (Some((tag, body)), None) = (entries.next(), entries.next()) else {
            return Err(de::Error::custom("constant must be a single tagged entry"));
        };

        let integer = |v: &serde_json::Value| -> Result<i64, D::Error> {
            v.as_i64()
                .ok_or_else(|| de::Error::custom(format!("{tag} value '{v}' is not an integer")))
        };
        let out_of_range = |v: i64| -> D::Error { de::Error::custom(format!("{tag} value '{v}' is out of range")) };

        let value = match tag.as_str() {
            "BOOL_C" => Constant::Boolean(
                body.value
                    .as_bool()
                    .ok_or_else(|| de::Error::custom("BOOL_C value is not a boolean"))?,
            ),
            "BYTE_C" => {
                let v = integer(&body.value)?;
                Constant::Byte(i8::try_from(v).map_err(|_| out_of_range(v))?)
            }
            "SHORT_C" => {
                let v = integer(&body.value)?;
                Constant::Short(i16::try_from(v).map_err(|_| out_of_range(v))?)
            }
            "INTEGER_C" => {
                let v = integer(&body.value)?;
                Constant::Integer(i32::try_from(v).map_err(|_| out_of_range(v))?)
            }
            "LONG_C" => Constant::Long(integer(&body.value)?),
            "DOUBLE_C" => Constant::Double(
                body.value
                    .as_f64()
                    .ok_or_else(|| de::Error::custom("DOUBLE_C value is not a number"))?,
            ),
            "STRING_C" => Constant::String(
                body.value
                    .as_str()
                    .ok_or_else(|| de::Error::custom("STRING_C value is not a string"))?
                    .to_string(),
            ),
            "NULL_C" => Constant::Null,
            other => return Err(de::Error::custom(format!("unknown node tag '{other}'"))),
        };
        Ok(ConstantExpr {
            value,
            location: body.location,
        })
    }
}

impl Expr {
    pub fn constant(value: Constant, location: Location) -> Expr {
        Expr::Constant(ConstantExpr { value, location })
    }

    pub fn boolean(value: bool, location: Location) -> Expr {
        Expr::constant(Constant::Boolean(value), location)
    }

    pub fn path(components: &[&str], location: Location) -> Expr {
        Expr::Path(PathAccessor::new(
            components.iter().map(|c| c.to_string()).collect(),
            location,
        ))
    }

    pub fn not(expr: Expr) -> Expr {
        let location = expr.location();
        Expr::Not(UnaryBoolean {
            expr: Box::new(expr),
            location,
        })
    }

    pub fn binary_boolean(op: BoolOp, left: Expr, right: Expr) -> Expr {
        let location = left.location();
        Expr::BinaryBoolean(BinaryBoolean {
            op,
            left: Box::new(left),
            right: Box::new(right),
            location,
        })
    }

    pub fn location(&self) -> Location {
        match self {
            Expr::Path(n) => n.location,
            Expr::Parameter(n) => n.location,
            Expr::Comparison(n) => n.location,
            Expr::BinaryBoolean(n) => n.location,
            Expr::Not(n) => n.location,
            Expr::BooleanValue(n) => n.location,
            Expr::ExplicitMembership(n) => n.location,
            Expr::VectorMembership(n) => n.location,
            Expr::NullTest(n) => n.location,
            Expr::Bounds(n) => n.location,
            Expr::BinaryValue(n) => n.location,
            Expr::UnaryValue(n) => n.location,
            Expr::Cast(n) => n.location,
            Expr::Now(n) => n.location,
            Expr::Conversion(n) => n.location,
            Expr::Quantum(n) => n.location,
            Expr::Aggregation(n) => n.location,
            Expr::Function(n) => n.location,
            Expr::Boundary(n) => n.location,
            Expr::Constant(n) => n.location,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Expr::Constant(c) => Some(&c.value),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathAccessor> {
        match self {
            Expr::Path(p) => Some(p),
            _ => None,
        }
    }

    /// True for nodes that produce a boolean by construction.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Expr::Comparison(_)
                | Expr::BinaryBoolean(_)
                | Expr::Not(_)
                | Expr::BooleanValue(_)
                | Expr::ExplicitMembership(_)
                | Expr::VectorMembership(_)
                | Expr::NullTest(_)
                | Expr::Bounds(_)
                | Expr::Boundary(_)
        )
    }

    /// Node name used by explain output.
    pub fn node_name(&self) -> &'static str {
        match self {
            Expr::Path(_) => "PathAccessor",
            Expr::Parameter(_) => "ParameterAccessor",
            Expr::Comparison(_) => "ValueComparisonBooleanExpression",
            Expr::BinaryBoolean(_) => "BinaryBooleanExpression",
            Expr::Not(_) => "UnaryBooleanExpression",
            Expr::BooleanValue(_) => "BooleanValueExpression",
            Expr::ExplicitMembership(_) => "ExplicitMembershipTestBooleanExpression",
            Expr::VectorMembership(_) => "VectorMembershipTestBooleanExpression",
            Expr::NullTest(_) => "NullTestBooleanExpression",
            Expr::Bounds(_) => "BoundsTestBooleanExpression",
            Expr::BinaryValue(_) => "BinaryValueExpression",
            Expr::UnaryValue(_) => "UnaryValueExpression",
            Expr::Cast(_) => "CastValueExpression",
            Expr::Now(_) => "NowValueExpression",
            Expr::Conversion(_) => "DateTimeConversionExpression",
            Expr::Quantum(_) => "DateTimeQuantumExpression",
            Expr::Aggregation(_) => "AggregationValueExpression",
            Expr::Function(_) => "FunctionExpression",
            Expr::Boundary(_) => "BoundaryBooleanExpression",
            Expr::Constant(c) => c.value.explain_name(),
        }
    }
}
