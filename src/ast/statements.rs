use crate::ast::expressions::Expr;
use crate::datatype::DataType;
use crate::error::Location;
use crate::symbols::ScopeHandle;
use serde::{Deserialize, Serialize};

/// Declared parameter of a query, funnel or segment.
///
/// ```text
/// select(days: long, ids: vector[integer]) ...
/// funnel 'f'(x: long) conversion { ... }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub dtype: DataType,
    #[serde(default)]
    pub vector: bool,
    #[serde(default)]
    pub location: Location,
}

/// A sequence of statements finalized in order, each in its own scope.
///
/// Funnels and segments register themselves so later statements can
/// name them as sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Statements {
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    #[serde(rename = "QUERY")]
    Query(Query),
    #[serde(rename = "SEGMENT")]
    Segment(Segment),
    #[serde(rename = "FUNNEL")]
    Funnel(Funnel),
}

impl Statement {
    pub fn location(&self) -> Location {
        match self {
            Statement::Query(q) => q.location,
            Statement::Segment(s) => s.location,
            Statement::Funnel(f) => f.location,
        }
    }
}

// ----------------------------------------------------------------------------
// Sources
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "SCHEMA_SOURCE")]
    Schema(SchemaSource),
    #[serde(rename = "FUNNEL_SOURCE")]
    Funnel(StatementSource),
    #[serde(rename = "SEGMENT_SOURCE")]
    Segment(StatementSource),
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Schema(s) => &s.name,
            Source::Funnel(s) | Source::Segment(s) => &s.name,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Source::Schema(s) => s.alias.as_deref(),
            Source::Funnel(s) | Source::Segment(s) => s.alias.as_deref(),
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Source::Schema(s) => s.location,
            Source::Funnel(s) | Source::Segment(s) => s.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSource {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub location: Location,
}

/// A funnel or segment used as a source, with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSource {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub location: Location,
}

// ----------------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------------

/// ```text
/// select(days: long) count(user) as users, day(user.sessions.startTime) as day
///   beside select count(user.sessions) as sessions
///   from schema quo
///   where user.sessions.startTime > NOW - DAYS($days)
///   limit 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    pub selects: Vec<Select>,
    pub sources: Vec<Source>,
    #[serde(default, rename = "where")]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Select {
    pub name: String,
    pub targets: Vec<Target>,
    #[serde(default, rename = "where")]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub limit: Option<i64>,
    /// Scope saved by bind, re-entered by validate and optimize.
    #[serde(skip)]
    pub scope: Option<ScopeHandle>,
    #[serde(default)]
    pub location: Location,
}

impl PartialEq for Select {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.targets == other.targets
            && self.filter == other.filter
            && self.limit == other.limit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Target {
    pub name: String,
    pub expr: Expr,
    #[serde(default)]
    pub location: Location,
}

// ----------------------------------------------------------------------------
// Segments
// ----------------------------------------------------------------------------

/// ```text
/// segment 'returning' {
///     segment 1 when user.sessions.events.id in (1, 2, 3)
///     segment 2 when user.sessions.events.id not in (1, 2, 3)
/// } from schema quo
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    pub sources: Vec<Source>,
    pub definitions: Vec<SegmentDefinition>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct SegmentDefinition {
    /// Written identifier; validation requires it to be a long.
    pub id: String,
    #[serde(rename = "where")]
    pub predicate: Expr,
    #[serde(default)]
    pub location: Location,
}

// ----------------------------------------------------------------------------
// Funnels
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunnelType {
    Conversion,
    Transaction,
}

impl FunnelType {
    pub fn keyword(self) -> &'static str {
        match self {
            FunnelType::Conversion => "CONVERSION",
            FunnelType::Transaction => "TRANSACTION",
        }
    }
}

/// ```text
/// funnel 'checkout' conversion within days(1) limit 1000 {
///     step 1 when user.sessions.events.id == 10
///     step 2 when user.sessions.events.id == 11 within minutes(5)
///     1 : 2
/// } from schema quo
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funnel {
    pub name: String,
    pub funnel_type: FunnelType,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    pub sources: Vec<Source>,
    pub steps: Vec<StepDefinition>,
    pub definition: MatchDefinition,
    #[serde(default)]
    pub within: Option<Expr>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct StepDefinition {
    pub id: i64,
    pub when: Expr,
    /// Inferred from the ordering field of the `when` structure when not
    /// written.
    #[serde(default)]
    pub timing: Option<Expr>,
    #[serde(default)]
    pub after: Option<Expr>,
    #[serde(default)]
    pub within: Option<Expr>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOp {
    /// `a : b`, in sequence
    And,
    /// `a | b`, either
    Or,
}

/// The pattern a funnel matches over its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchDefinition {
    #[serde(rename = "FUNNEL_DEFINITION_LIST")]
    List(MatchList),
    #[serde(rename = "FUNNEL_BRACKET_LIST")]
    Bracket(MatchBracket),
    #[serde(rename = "FUNNEL_DEFINITION_REPEAT")]
    Repeat(MatchRepeat),
    #[serde(rename = "FUNNEL_DEFINITION_STEPID")]
    Step(MatchStep),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchList {
    pub op: MatchOp,
    pub items: Vec<MatchDefinition>,
    #[serde(default = "capturing")]
    pub capture: bool,
    #[serde(default)]
    pub location: Location,
}

/// `[1 2 3]` or `[^1 2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBracket {
    #[serde(default)]
    pub negated: bool,
    pub steps: Vec<MatchStep>,
    #[serde(default = "capturing")]
    pub capture: bool,
    #[serde(default)]
    pub location: Location,
}

/// `x*`, `x+`, `x?` or `x[min:max]`; `max` of `None` is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRepeat {
    pub min: i64,
    #[serde(default)]
    pub max: Option<i64>,
    pub definition: Box<MatchDefinition>,
    #[serde(default = "capturing")]
    pub capture: bool,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStep {
    pub id: i64,
    #[serde(default = "capturing")]
    pub capture: bool,
    #[serde(default)]
    pub location: Location,
}

fn capturing() -> bool {
    true
}

impl MatchDefinition {
    pub fn capture(&self) -> bool {
        match self {
            MatchDefinition::List(m) => m.capture,
            MatchDefinition::Bracket(m) => m.capture,
            MatchDefinition::Repeat(m) => m.capture,
            MatchDefinition::Step(m) => m.capture,
        }
    }

    pub fn set_non_capture(&mut self) {
        match self {
            MatchDefinition::List(m) => m.capture = false,
            MatchDefinition::Bracket(m) => m.capture = false,
            MatchDefinition::Repeat(m) => m.capture = false,
            MatchDefinition::Step(m) => m.capture = false,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            MatchDefinition::List(m) => m.location,
            MatchDefinition::Bracket(m) => m.location,
            MatchDefinition::Repeat(m) => m.location,
            MatchDefinition::Step(m) => m.location,
        }
    }
}
