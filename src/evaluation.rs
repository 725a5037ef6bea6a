//! # The bind, validate, optimize pipeline
//!
//! Every tree the parser builds goes through three phases before it is
//! handed to a caller:
//!
//! - **bind** resolves names against the [`PathSymbols`] table, filling in
//!   path bindings, parameter definitions and function kinds
//! - **validate** type- and axis-checks the bound tree against the
//!   evaluation point it will run at, and fills in defaults that depend on
//!   that point (aggregation scopes, inferred step timing)
//! - **optimize** folds reducible expressions into constants
//!
//! The phases share one [`EvalStack`] describing where in a statement the
//! walk currently is, so nodes like `frequency(...)` or `START OF` can check
//! that they appear in a legal position.

pub mod binding;
pub mod expressions;
pub mod functions;
pub mod rules;
pub mod statements;

use crate::error::{Location, MotifError, Result};
use crate::path::Path;
use crate::symbols::PathSymbols;
use std::fmt;

/// A node that takes part in the pipeline.
pub trait Evaluation: Sized {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()>;

    /// Check the bound node as evaluated at `scope`.
    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()>;

    fn optimize(self, symbols: &mut PathSymbols) -> Result<Self>;

    /// Run all three phases, evaluating at `scope`.
    fn finalize(mut self, symbols: &mut PathSymbols, scope: &Path) -> Result<Self> {
        let mut stack = EvalStack::default();
        self.bind(symbols, &mut stack)?;
        self.validate(symbols, scope, &mut stack)?;
        self.optimize(symbols)
    }
}

/// A statement-level position in the tree being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Statements,
    Query,
    Select,
    Target,
    Segment,
    SegmentDefinition,
    Funnel,
    Step,
    View,
    Rule,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default)]
pub struct EvalStack {
    frames: Vec<Frame>,
}

impl EvalStack {
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Result<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| MotifError::internal("evaluation stack underflow"))
    }

    /// True when `frame` is anywhere on the stack.
    pub fn within(&self, frame: Frame) -> bool {
        self.frames.contains(&frame)
    }

    pub fn top(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    /// Run `f` with `frame` pushed, popping it again whatever `f` returns.
    pub fn framed<T>(&mut self, frame: Frame, f: impl FnOnce(&mut EvalStack) -> Result<T>) -> Result<T> {
        self.push(frame);
        let result = f(self);
        self.pop()?;
        result
    }
}

/// A user-facing error at `location`.
pub(crate) fn fail<T>(location: Location, message: impl Into<String>) -> Result<T> {
    Err(MotifError::parse(location, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_pops_on_error() {
        let mut stack = EvalStack::default();
        let result: Result<()> = stack.framed(Frame::Select, |s| {
            assert!(s.within(Frame::Select));
            fail(Location::default(), "boom")
        });
        assert!(result.is_err());
        assert_eq!(stack.top(), None);
        assert!(stack.pop().unwrap_err().is_internal());
    }
}
