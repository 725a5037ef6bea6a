//! # Motif Language - Syntax Tree
//!
//! This module defines the syntax tree for Motif, a query and filter language
//! over schema-typed object trees. Trees are built by the parser, then
//! rewritten in place by the bind, validate and optimize phases.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[operators]** - Comparison, logical, arithmetic and date-time operators
//! - **[constants]** - Literal values and constant folding arithmetic
//! - **[bindings]** - What a path accessor resolved to
//! - **[expressions]** - Value and boolean expression nodes
//! - **[rules]** - Include, exclude and sample rules of a view
//! - **[view]** - Views and the union, intersection and complement algebra
//! - **[statements]** - Queries, segments and funnels
//!
//! ## Quick Start
//!
//! ```text
//! view 'recent' {
//!     include user where user.sessions.startTime > NOW - DAYS(30)
//! }
//! ```
//!
//! ```text
//! select count(user.sessions) as sessions, day(user.sessions.startTime) as day
//! from schema quo
//! where user.sessions.events.id in (1, 2, 3)
//! ```
//!
//! ## Core Concepts
//!
//! ### Evaluation Points
//!
//! Every bound expression has a lowest evaluation point in the object tree,
//! its axis. Combining expressions whose axes are on different branches of
//! the tree is rejected during validation.
//!
//! ### Wire Format
//!
//! Every node serializes as a single tagged entry, `{"TAG": {fields}}`, with
//! stable tag strings such as `VAL_COMP_BE`, `PATH` or `LONG_C`.
pub mod tokens;
pub mod operators;
pub mod constants;
pub mod bindings;
pub mod expressions;
pub mod rules;
pub mod view;
pub mod statements;

pub use tokens::Token;
pub use operators::{
    AggregationOp, BoolOp, BoundaryOp, BoundsOp, CompareOp, ConversionOp, MembershipOp, NullTestOp,
    TimeOp, UnaryValueOp, ValueOp,
};
pub use constants::Constant;
pub use bindings::{Binding, BoundPath};
pub use expressions::{ConstantExpr, Expr, FunctionKind, ParameterAccessor, PathAccessor};
pub use rules::{EditAction, EditRule, FilterRule, SampleRule};
pub use view::View;
pub use statements::{
    Funnel, FunnelType, MatchDefinition, ParameterDefinition, Query, Segment, SegmentDefinition,
    Select, Source, Statement, Statements, StepDefinition, Target,
};
