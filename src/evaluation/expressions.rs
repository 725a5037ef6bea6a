//! Bind, validate, optimize and constant folding for expressions.

use crate::ast::expressions::{Aggregation, BinaryBoolean};
use crate::ast::{
    AggregationOp, Binding, BoolOp, BoundsOp, CompareOp, Constant, Expr, MembershipOp, NullTestOp,
    PathAccessor, UnaryValueOp,
};
use crate::datatype::DataType;
use crate::error::{Location, MotifError, Result};
use crate::evaluation::binding::bind_path;
use crate::evaluation::{EvalStack, Evaluation, Frame, fail, functions};
use crate::path::{Path, lowest};
use crate::symbols::PathSymbols;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::trace;

impl PathAccessor {
    /// The binding recorded by bind.
    pub fn bound(&self) -> Result<&Binding> {
        self.binding
            .as_ref()
            .ok_or_else(|| MotifError::internal(format!("path accessor '{}' is not bound", self.full_path())))
    }
}

fn optimize_box(expr: Box<Expr>, symbols: &mut PathSymbols) -> Result<Box<Expr>> {
    Ok(Box::new((*expr).optimize(symbols)?))
}

fn optimize_opt(expr: Option<Box<Expr>>, symbols: &mut PathSymbols) -> Result<Option<Box<Expr>>> {
    expr.map(|e| optimize_box(e, symbols)).transpose()
}

impl Evaluation for Expr {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        match self {
            Expr::Constant(_) | Expr::Now(_) => Ok(()),
            Expr::Path(p) => bind_path(p, symbols, stack),
            Expr::Parameter(p) => {
                let Some(definition) = symbols.parameter(&p.name).cloned() else {
                    return fail(p.location, format!("the parameter, '{}', is not defined", p.name));
                };
                p.definition = Some(definition);
                p.eval_point = Some(symbols.current_root_path().map(Path::Schema).unwrap_or(Path::Constant));
                Ok(())
            }
            Expr::Comparison(n) => {
                n.left.bind(symbols, stack)?;
                n.right.bind(symbols, stack)
            }
            Expr::BinaryBoolean(n) => {
                n.left.bind(symbols, stack)?;
                n.right.bind(symbols, stack)
            }
            Expr::Not(n) => n.expr.bind(symbols, stack),
            Expr::BooleanValue(n) => n.expr.bind(symbols, stack),
            Expr::ExplicitMembership(n) => {
                n.left.bind(symbols, stack)?;
                n.members.iter_mut().try_for_each(|m| m.bind(symbols, stack))
            }
            Expr::VectorMembership(n) => {
                n.left.bind(symbols, stack)?;
                n.vector.bind(symbols, stack)
            }
            Expr::NullTest(n) => n.expr.bind(symbols, stack),
            Expr::Bounds(n) => {
                n.expr.bind(symbols, stack)?;
                n.lower.bind(symbols, stack)?;
                n.upper.bind(symbols, stack)
            }
            Expr::BinaryValue(n) => {
                n.left.bind(symbols, stack)?;
                n.right.bind(symbols, stack)
            }
            Expr::UnaryValue(n) => n.expr.bind(symbols, stack),
            Expr::Cast(n) => n.expr.bind(symbols, stack),
            Expr::Conversion(n) => n.expr.bind(symbols, stack),
            Expr::Quantum(n) => {
                if n.timezone.is_none() {
                    n.timezone = Some(symbols.default_time_zone().to_string());
                }
                n.expr.bind(symbols, stack)
            }
            Expr::Aggregation(n) => {
                n.expr.bind(symbols, stack)?;
                for clause in [&mut n.scope, &mut n.quanta, &mut n.filter].into_iter().flatten() {
                    clause.bind(symbols, stack)?;
                }
                Ok(())
            }
            Expr::Function(call) => functions::bind(call, symbols, stack),
            Expr::Boundary(n) => bind_path(&mut n.target, symbols, stack),
        }
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        let location = self.location();
        match self {
            Expr::Constant(_) | Expr::Now(_) => Ok(()),
            Expr::Path(p) => p.bound().map(|_| ()),
            Expr::Parameter(p) => match p.definition {
                Some(_) => Ok(()),
                None => Err(MotifError::internal(format!("parameter '{}' is not bound", p.name))),
            },
            Expr::Comparison(n) => {
                n.left.validate(symbols, scope, stack)?;
                n.right.validate(symbols, scope, stack)?;
                check_comparable(&n.left, &n.right, location)?;
                if n.op.is_ordering() {
                    check_orderable(&[&n.left, &n.right], n.op, location)?;
                }
                if lowest_point(&[&n.left, &n.right])?.is_none() {
                    return fail(
                        location,
                        format!(
                            "the left, '{}', and right, '{}', expressions are not on the same axis",
                            n.left.motif(),
                            n.right.motif()
                        ),
                    );
                }
                Ok(())
            }
            Expr::BinaryBoolean(n) => {
                n.left.validate(symbols, scope, stack)?;
                n.right.validate(symbols, scope, stack)?;
                check_boolean(&n.left, location)?;
                check_boolean(&n.right, location)?;
                if lowest_point(&[&n.left, &n.right])?.is_none() {
                    return fail(
                        location,
                        format!(
                            "the left, '{}', and right, '{}', sides of {} are not on the same axis",
                            n.left.motif(),
                            n.right.motif(),
                            n.op.keyword()
                        ),
                    );
                }
                Ok(())
            }
            Expr::Not(n) => {
                n.expr.validate(symbols, scope, stack)?;
                check_boolean(&n.expr, location)
            }
            Expr::BooleanValue(n) => {
                n.expr.validate(symbols, scope, stack)?;
                check_boolean(&n.expr, location)
            }
            Expr::ExplicitMembership(n) => {
                n.left.validate(symbols, scope, stack)?;
                let left_point = n.left.eval_point()?;
                for member in &mut n.members {
                    member.validate(symbols, scope, stack)?;
                    check_comparable(&n.left, member, location)?;
                    let point = member.eval_point()?;
                    if left_point.higher(&point) || left_point.not_on_path(&point) {
                        return fail(
                            location,
                            format!(
                                "the member, '{}', must not evaluate below '{}'",
                                member.motif(),
                                n.left.motif()
                            ),
                        );
                    }
                }
                Ok(())
            }
            Expr::VectorMembership(n) => {
                n.left.validate(symbols, scope, stack)?;
                n.vector.validate(symbols, scope, stack)?;
                let is_vector = match n.vector.as_ref() {
                    Expr::Parameter(p) => p.definition.as_ref().is_some_and(|d| d.vector),
                    Expr::Path(p) => matches!(p.bound()?, Binding::ValueVector(_) | Binding::ValueMap { .. }),
                    _ => false,
                };
                if !is_vector {
                    return fail(location, format!("'{}' is not a vector", n.vector.motif()));
                }
                check_comparable(&n.left, &n.vector, location)?;
                if lowest_point(&[&n.left, &n.vector])?.is_none() {
                    return fail(
                        location,
                        format!(
                            "the value, '{}', and vector, '{}', are not on the same axis",
                            n.left.motif(),
                            n.vector.motif()
                        ),
                    );
                }
                Ok(())
            }
            Expr::NullTest(n) => n.expr.validate(symbols, scope, stack),
            Expr::Bounds(n) => {
                n.expr.validate(symbols, scope, stack)?;
                n.lower.validate(symbols, scope, stack)?;
                n.upper.validate(symbols, scope, stack)?;
                check_comparable(&n.expr, &n.lower, location)?;
                check_comparable(&n.expr, &n.upper, location)?;
                check_orderable(&[&n.expr, &n.lower, &n.upper], CompareOp::Lte, location)?;
                if lowest_point(&[&n.expr, &n.lower, &n.upper])?.is_none() {
                    return fail(
                        location,
                        format!(
                            "the expression, '{}', and bounds, '{}' and '{}', are not on the same axis",
                            n.expr.motif(),
                            n.lower.motif(),
                            n.upper.motif()
                        ),
                    );
                }
                let point = n.expr.eval_point()?;
                for bound in [&n.lower, &n.upper] {
                    if point.higher(&bound.eval_point()?) {
                        return fail(
                            location,
                            format!("the bound, '{}', evaluates below '{}'", bound.motif(), n.expr.motif()),
                        );
                    }
                }
                Ok(())
            }
            Expr::BinaryValue(n) => {
                n.left.validate(symbols, scope, stack)?;
                n.right.validate(symbols, scope, stack)?;
                check_numeric(&n.left, location)?;
                check_numeric(&n.right, location)?;
                if lowest_point(&[&n.left, &n.right])?.is_none() {
                    return fail(
                        location,
                        format!(
                            "the left, '{}', and right, '{}', operands of {} are not on the same axis",
                            n.left.motif(),
                            n.right.motif(),
                            n.op.symbol()
                        ),
                    );
                }
                Ok(())
            }
            Expr::UnaryValue(n) => {
                n.expr.validate(symbols, scope, stack)?;
                check_numeric(&n.expr, location)
            }
            Expr::Cast(n) => {
                n.expr.validate(symbols, scope, stack)?;
                if n.expr.dtype()? == DataType::Structure {
                    return fail(location, format!("'{}' cannot be cast to {}", n.expr.motif(), n.dtype));
                }
                if n.expr.can_reduce_to_constant() {
                    n.expr
                        .reduce_to_constant()?
                        .cast_to(n.dtype)
                        .or_else(|message| fail(location, message))?;
                }
                Ok(())
            }
            Expr::Conversion(n) => {
                n.expr.validate(symbols, scope, stack)?;
                check_numeric(&n.expr, location)
            }
            Expr::Quantum(n) => {
                n.expr.validate(symbols, scope, stack)?;
                check_numeric(&n.expr, location)?;
                if n.timezone.as_deref().is_some_and(|tz| tz.trim().is_empty()) {
                    return fail(location, format!("'{}' has an empty timezone", n.op.keyword()));
                }
                Ok(())
            }
            Expr::Aggregation(n) => validate_aggregation(n, symbols, scope, stack),
            Expr::Function(call) => functions::validate(call, symbols, scope, stack),
            Expr::Boundary(n) => {
                if !n.target.bound()?.is_instance() {
                    return fail(
                        location,
                        format!("'{}' must be an instance reference", n.target.full_path()),
                    );
                }
                if !stack.within(Frame::Step) {
                    return fail(location, format!("{} OF can only be used in a funnel step", n.op.keyword()));
                }
                Ok(())
            }
        }
    }

    fn optimize(self, symbols: &mut PathSymbols) -> Result<Expr> {
        let expr = match self {
            Expr::Comparison(mut n) => {
                n.left = optimize_box(n.left, symbols)?;
                n.right = optimize_box(n.right, symbols)?;
                Expr::Comparison(n)
            }
            Expr::BinaryBoolean(mut n) => {
                n.left = optimize_box(n.left, symbols)?;
                n.right = optimize_box(n.right, symbols)?;
                simplify_boolean(n.op, *n.left, *n.right, n.location)
            }
            Expr::Not(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::Not(n)
            }
            Expr::BooleanValue(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::BooleanValue(n)
            }
            Expr::ExplicitMembership(mut n) => {
                n.left = optimize_box(n.left, symbols)?;
                n.members = n
                    .members
                    .into_iter()
                    .map(|m| m.optimize(symbols))
                    .collect::<Result<Vec<_>>>()?;
                Expr::ExplicitMembership(n)
            }
            Expr::VectorMembership(mut n) => {
                n.left = optimize_box(n.left, symbols)?;
                n.vector = optimize_box(n.vector, symbols)?;
                Expr::VectorMembership(n)
            }
            Expr::NullTest(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::NullTest(n)
            }
            Expr::Bounds(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                n.lower = optimize_box(n.lower, symbols)?;
                n.upper = optimize_box(n.upper, symbols)?;
                Expr::Bounds(n)
            }
            Expr::BinaryValue(mut n) => {
                n.left = optimize_box(n.left, symbols)?;
                n.right = optimize_box(n.right, symbols)?;
                Expr::BinaryValue(n)
            }
            Expr::UnaryValue(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::UnaryValue(n)
            }
            Expr::Cast(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::Cast(n)
            }
            Expr::Conversion(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::Conversion(n)
            }
            Expr::Quantum(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                Expr::Quantum(n)
            }
            Expr::Aggregation(mut n) => {
                n.expr = optimize_box(n.expr, symbols)?;
                n.quanta = optimize_opt(n.quanta, symbols)?;
                n.filter = optimize_opt(n.filter, symbols)?;
                Expr::Aggregation(n)
            }
            Expr::Function(mut call) => {
                call.args = call
                    .args
                    .into_iter()
                    .map(|a| a.optimize(symbols))
                    .collect::<Result<Vec<_>>>()?;
                Expr::Function(call)
            }
            Expr::Path(mut p) => {
                p.key = optimize_opt(p.key, symbols)?;
                Expr::Path(p)
            }
            leaf @ (Expr::Constant(_) | Expr::Now(_) | Expr::Parameter(_) | Expr::Boundary(_)) => leaf,
        };
        expr.fold()
    }
}

impl Expr {
    /// Replace a reducible expression with its constant.
    fn fold(self) -> Result<Expr> {
        if matches!(self, Expr::Constant(_)) || !self.can_reduce_to_constant() {
            return Ok(self);
        }
        let value = self.reduce_to_constant()?;
        trace!(expr = %self.motif(), value = %value.motif(), "folded");
        Ok(Expr::constant(value, self.location()))
    }

    pub fn can_reduce_to_constant(&self) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::Path(_)
            | Expr::Parameter(_)
            | Expr::Now(_)
            | Expr::Quantum(_)
            | Expr::Aggregation(_)
            | Expr::VectorMembership(_)
            | Expr::Boundary(_) => false,
            Expr::Comparison(n) => n.left.can_reduce_to_constant() && n.right.can_reduce_to_constant(),
            Expr::BinaryBoolean(n) => n.left.can_reduce_to_constant() && n.right.can_reduce_to_constant(),
            Expr::Not(n) => n.expr.can_reduce_to_constant(),
            Expr::BooleanValue(n) => n.expr.can_reduce_to_constant(),
            Expr::ExplicitMembership(n) => {
                n.left.can_reduce_to_constant() && n.members.iter().all(Expr::can_reduce_to_constant)
            }
            Expr::NullTest(n) => n.expr.can_reduce_to_constant(),
            Expr::Bounds(n) => {
                n.expr.can_reduce_to_constant()
                    && n.lower.can_reduce_to_constant()
                    && n.upper.can_reduce_to_constant()
            }
            Expr::BinaryValue(n) => n.left.can_reduce_to_constant() && n.right.can_reduce_to_constant(),
            Expr::UnaryValue(n) => n.expr.can_reduce_to_constant(),
            Expr::Cast(n) => n.expr.can_reduce_to_constant(),
            Expr::Conversion(n) => n.expr.can_reduce_to_constant(),
            Expr::Function(call) => functions::can_reduce(call),
        }
    }

    pub fn reduce_to_constant(&self) -> Result<Constant> {
        let location = self.location();
        let folded = |result: std::result::Result<Constant, String>| result.or_else(|message| fail(location, message));
        match self {
            Expr::Constant(c) => Ok(c.value.clone()),
            Expr::Comparison(n) => {
                let (l, r) = (n.left.reduce_to_constant()?, n.right.reduce_to_constant()?);
                folded(l.compare_with(n.op, &r).map(Constant::Boolean))
            }
            Expr::BinaryBoolean(n) => {
                let (l, r) = (n.left.reduce_to_constant()?, n.right.reduce_to_constant()?);
                Ok(match (n.op, l.as_bool(), r.as_bool()) {
                    (BoolOp::And, Some(false), _) | (BoolOp::And, _, Some(false)) => Constant::Boolean(false),
                    (BoolOp::And, Some(true), Some(true)) => Constant::Boolean(true),
                    (BoolOp::Or, Some(true), _) | (BoolOp::Or, _, Some(true)) => Constant::Boolean(true),
                    (BoolOp::Or, Some(false), Some(false)) => Constant::Boolean(false),
                    _ => Constant::Null,
                })
            }
            Expr::Not(n) => Ok(match n.expr.reduce_to_constant()?.as_bool() {
                Some(b) => Constant::Boolean(!b),
                None => Constant::Null,
            }),
            Expr::BooleanValue(n) => match n.expr.reduce_to_constant()? {
                value @ (Constant::Boolean(_) | Constant::Null) => Ok(value),
                other => fail(location, format!("the expression, '{}', must be a boolean", other.motif())),
            },
            Expr::ExplicitMembership(n) => {
                let left = n.left.reduce_to_constant()?;
                let mut found = false;
                for member in &n.members {
                    found |= left.loosely_equals(&member.reduce_to_constant()?);
                }
                Ok(Constant::Boolean(match n.op {
                    MembershipOp::In => found,
                    MembershipOp::NotIn => !found,
                }))
            }
            Expr::NullTest(n) => {
                let null = n.expr.reduce_to_constant()?.is_null();
                Ok(Constant::Boolean(match n.op {
                    NullTestOp::IsNull => null,
                    NullTestOp::IsNotNull => !null,
                }))
            }
            Expr::Bounds(n) => {
                let value = n.expr.reduce_to_constant()?;
                let lower = n.lower.reduce_to_constant()?;
                let upper = n.upper.reduce_to_constant()?;
                let inside = lower
                    .compare_with(CompareOp::Lte, &value)
                    .and_then(|lo| Ok(lo && value.compare_with(CompareOp::Lt, &upper)?));
                folded(inside.map(|inside| {
                    Constant::Boolean(match n.op {
                        BoundsOp::Between => inside,
                        BoundsOp::NotBetween => !inside,
                    })
                }))
            }
            Expr::BinaryValue(n) => {
                let (l, r) = (n.left.reduce_to_constant()?, n.right.reduce_to_constant()?);
                folded(l.arithmetic(n.op, &r))
            }
            Expr::UnaryValue(n) => {
                let value = n.expr.reduce_to_constant()?;
                match n.op {
                    UnaryValueOp::Normal => Ok(value),
                    UnaryValueOp::Negate => folded(value.negate()),
                }
            }
            Expr::Cast(n) => folded(n.expr.reduce_to_constant()?.cast_to(n.dtype)),
            Expr::Conversion(n) => {
                let value = n.expr.reduce_to_constant()?;
                if value.is_null() {
                    return Ok(Constant::Null);
                }
                let millis = value
                    .as_f64()
                    .and_then(Decimal::from_f64)
                    .zip(Decimal::from_f64(n.op.millis()))
                    .and_then(|(v, m)| v.checked_mul(m))
                    .and_then(|r| r.round().to_i64());
                match millis {
                    Some(ms) => Ok(Constant::Long(ms)),
                    None => fail(location, format!("'{}' is out of range", self.motif())),
                }
            }
            Expr::Function(call) => functions::reduce(call),
            other => Err(MotifError::internal(format!(
                "'{}' cannot be reduced to a constant",
                other.motif()
            ))),
        }
    }

    /// Result type of the bound expression.
    pub fn dtype(&self) -> Result<DataType> {
        Ok(match self {
            Expr::Constant(c) => c.value.dtype(),
            Expr::Path(p) => p.bound()?.dtype(),
            Expr::Parameter(p) => p
                .definition
                .as_ref()
                .map(|d| d.dtype)
                .ok_or_else(|| MotifError::internal(format!("parameter '{}' is not bound", p.name)))?,
            Expr::Comparison(_)
            | Expr::BinaryBoolean(_)
            | Expr::Not(_)
            | Expr::BooleanValue(_)
            | Expr::ExplicitMembership(_)
            | Expr::VectorMembership(_)
            | Expr::NullTest(_)
            | Expr::Bounds(_)
            | Expr::Boundary(_) => DataType::Boolean,
            Expr::BinaryValue(n) => {
                let (l, r) = (n.left.dtype()?, n.right.dtype()?);
                DataType::common(l, r).ok_or_else(|| {
                    MotifError::parse(
                        n.location,
                        format!("the operands of '{}' ({l} and {r}) have no common type", self.motif()),
                    )
                })?
            }
            Expr::UnaryValue(n) => n.expr.dtype()?,
            Expr::Cast(n) => n.dtype,
            Expr::Now(_) => DataType::DateTime,
            Expr::Conversion(_) => DataType::Long,
            Expr::Quantum(n) if n.op.is_ordinal() => DataType::Long,
            Expr::Quantum(_) => DataType::DateTime,
            Expr::Aggregation(n) => match n.op {
                AggregationOp::Count | AggregationOp::Unique => DataType::Long,
                AggregationOp::Sum if n.expr.dtype()? == DataType::Double => DataType::Double,
                AggregationOp::Sum => DataType::Long,
                AggregationOp::Min | AggregationOp::Max | AggregationOp::Top => n.expr.dtype()?,
            },
            Expr::Function(call) => functions::dtype(call)?,
        })
    }

    /// The lowest point in the object tree the expression is evaluated at.
    pub fn eval_point(&self) -> Result<Path> {
        match self {
            Expr::Constant(_) | Expr::Now(_) => Ok(Path::Constant),
            Expr::Path(p) => Ok(p.bound()?.path().clone()),
            Expr::Parameter(p) => Ok(p.eval_point.clone().unwrap_or(Path::Constant)),
            Expr::Boundary(n) => Ok(n.target.bound()?.path().clone()),
            Expr::Not(n) => n.expr.eval_point(),
            Expr::BooleanValue(n) => n.expr.eval_point(),
            Expr::NullTest(n) => n.expr.eval_point(),
            Expr::UnaryValue(n) => n.expr.eval_point(),
            Expr::Cast(n) => n.expr.eval_point(),
            Expr::Conversion(n) => n.expr.eval_point(),
            Expr::Quantum(n) => n.expr.eval_point(),
            Expr::Comparison(n) => self.lowest_of(&[&n.left, &n.right]),
            Expr::BinaryBoolean(n) => self.lowest_of(&[&n.left, &n.right]),
            Expr::BinaryValue(n) => self.lowest_of(&[&n.left, &n.right]),
            Expr::Bounds(n) => self.lowest_of(&[&n.expr, &n.lower, &n.upper]),
            Expr::ExplicitMembership(n) => {
                let children = std::iter::once(n.left.as_ref()).chain(n.members.iter()).collect::<Vec<_>>();
                self.lowest_of(&children)
            }
            Expr::VectorMembership(n) => {
                // membership in a vector is decided at the vector's owner
                let vector = match n.vector.eval_point()? {
                    p @ Path::Schema(_) => p.parent(),
                    other => other,
                };
                let left = n.left.eval_point()?;
                self.lowest_of_points(&[left, vector])
            }
            Expr::Aggregation(n) => match &n.scope {
                Some(scope) => scope.eval_point(),
                None => Ok(n.expr.eval_point()?.parent()),
            },
            Expr::Function(call) => functions::eval_point(call),
        }
    }

    fn lowest_of(&self, children: &[&Expr]) -> Result<Path> {
        let points = children.iter().map(|c| c.eval_point()).collect::<Result<Vec<_>>>()?;
        self.lowest_of_points(&points)
    }

    fn lowest_of_points(&self, points: &[Path]) -> Result<Path> {
        lowest(points.iter()).ok_or_else(|| {
            MotifError::parse(
                self.location(),
                format!("'{}' combines expressions that are not on the same axis", self.motif()),
            )
        })
    }
}

/// Lowest common point of `exprs`, `None` when they are off-axis.
fn lowest_point(exprs: &[&Expr]) -> Result<Option<Path>> {
    let points = exprs.iter().map(|e| e.eval_point()).collect::<Result<Vec<_>>>()?;
    Ok(lowest(points.iter()))
}

fn check_boolean(expr: &Expr, location: Location) -> Result<()> {
    match expr.dtype()? {
        DataType::Boolean | DataType::Null => Ok(()),
        other => fail(
            location,
            format!("the expression, '{}', must be a boolean, not {other}", expr.motif()),
        ),
    }
}

fn check_numeric(expr: &Expr, location: Location) -> Result<()> {
    let dtype = expr.dtype()?;
    if dtype.is_numeric() || dtype == DataType::Null {
        return Ok(());
    }
    fail(location, format!("the expression, '{}', must be numeric, not {dtype}", expr.motif()))
}

/// Both sides join, or one is a string literal readable as the other's type.
fn check_comparable(left: &Expr, right: &Expr, location: Location) -> Result<()> {
    let (l, r) = (left.dtype()?, right.dtype()?);
    if DataType::has_common(l, r) {
        return Ok(());
    }
    let coercible = |literal: &Expr, dtype: DataType| {
        literal
            .as_constant()
            .and_then(Constant::as_str)
            .is_some_and(|text| dtype.can_coerce(text))
    };
    if coercible(right, l) || coercible(left, r) {
        return Ok(());
    }
    fail(
        location,
        format!(
            "the types of '{}' ({l}) and '{}' ({r}) are not compatible",
            left.motif(),
            right.motif()
        ),
    )
}

fn check_orderable(exprs: &[&Expr], op: CompareOp, location: Location) -> Result<()> {
    for expr in exprs {
        if expr.dtype()? == DataType::Null {
            return fail(location, format!("can't perform {op} on NULL '{}'", expr.motif()));
        }
    }
    Ok(())
}

fn validate_aggregation(
    n: &mut Aggregation,
    symbols: &mut PathSymbols,
    scope: &Path,
    stack: &mut EvalStack,
) -> Result<()> {
    let location = n.location;
    n.expr.validate(symbols, scope, stack)?;

    if n.scope.is_none() && *scope != Path::Constant {
        let components = scope.to_string().split('.').map(str::to_string).collect();
        let mut accessor = PathAccessor::new(components, location);
        bind_path(&mut accessor, symbols, stack)?;
        n.scope = Some(Box::new(Expr::Path(accessor)));
    }
    if n.quanta.is_none() {
        n.quanta = Some(Box::new(Expr::constant(Constant::integer(1), location)));
    }

    let op = n.op.keyword();
    match n.op {
        AggregationOp::Count | AggregationOp::Unique if n.expr.as_path().is_none() => {
            return fail(location, format!("the {op} aggregation requires a path, '{}' is not one", n.expr.motif()));
        }
        AggregationOp::Sum | AggregationOp::Min | AggregationOp::Max => check_numeric(&n.expr, location)?,
        _ => {}
    }

    if let Some(quanta) = &n.quanta {
        let integral = quanta.can_reduce_to_constant() && quanta.reduce_to_constant()?.dtype().is_integral();
        if !integral {
            return fail(location, format!("rolling quanta '{}' must be a constant integer", quanta.motif()));
        }
    }

    let point = n.expr.eval_point()?;
    if let Some(scope_expr) = &n.scope {
        let Some(accessor) = scope_expr.as_path() else {
            return fail(location, format!("the scope, '{}', must be a path", scope_expr.motif()));
        };
        let binding = accessor.bound()?;
        if !binding.is_instance() {
            return fail(
                location,
                format!("the scope, '{}', must be an instance reference", accessor.full_path()),
            );
        }
        let scope_point = binding.path();
        if scope_point.not_on_path(&point) || point.higher(scope_point) {
            return fail(
                location,
                format!(
                    "the scope, '{}', and expression, '{}', are not on the same axis",
                    accessor.full_path(),
                    n.expr.motif()
                ),
            );
        }
    }

    if let Some(filter) = n.filter.as_deref_mut() {
        filter.validate(symbols, &point, stack)?;
        check_boolean(filter, location)?;
        if lowest_point(&[n.expr.as_ref(), &*filter])?.is_none() {
            return fail(
                location,
                format!(
                    "the where, '{}', is not on the axis of '{}'",
                    filter.motif(),
                    n.expr.motif()
                ),
            );
        }
    }
    Ok(())
}

/// Drop a constant side of AND / OR once the other side is known.
fn simplify_boolean(op: BoolOp, left: Expr, right: Expr, location: Location) -> Expr {
    let truth = |e: &Expr| e.as_constant().and_then(Constant::as_bool);
    match (op, truth(&left), truth(&right)) {
        (BoolOp::And, Some(false), _) | (BoolOp::And, _, Some(false)) => Expr::boolean(false, location),
        (BoolOp::Or, Some(true), _) | (BoolOp::Or, _, Some(true)) => Expr::boolean(true, location),
        (BoolOp::And, Some(true), _) | (BoolOp::Or, Some(false), _) => right,
        (BoolOp::And, _, Some(true)) | (BoolOp::Or, _, Some(false)) => left,
        _ => Expr::BinaryBoolean(BinaryBoolean {
            op,
            left: Box::new(left),
            right: Box::new(right),
            location,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expressions::BinaryValue;
    use crate::ast::ValueOp;

    fn long(v: i64) -> Expr {
        Expr::constant(Constant::Long(v), Location::default())
    }

    #[test]
    fn constant_arithmetic_reduces() {
        let expr = Expr::BinaryValue(BinaryValue {
            op: ValueOp::Modulo,
            left: Box::new(long(5999)),
            right: Box::new(long(34)),
            location: Location::default(),
        });
        assert!(expr.can_reduce_to_constant());
        assert_eq!(expr.reduce_to_constant().unwrap(), Constant::integer(15));
    }

    #[test]
    fn constant_sides_of_and_or_drop_away() {
        let path = Expr::path(&["user", "id"], Location::default());
        let t = Expr::boolean(true, Location::default());
        let f = Expr::boolean(false, Location::default());
        assert_eq!(simplify_boolean(BoolOp::And, t.clone(), path.clone(), Location::default()), path);
        assert_eq!(simplify_boolean(BoolOp::Or, path.clone(), f.clone(), Location::default()), path);
        assert!(matches!(
            simplify_boolean(BoolOp::Or, path.clone(), t, Location::default()).as_constant(),
            Some(Constant::Boolean(true))
        ));
        assert!(matches!(
            simplify_boolean(BoolOp::And, f, path.clone(), Location::default()).as_constant(),
            Some(Constant::Boolean(false))
        ));
        assert!(matches!(
            simplify_boolean(BoolOp::And, path.clone(), path, Location::default()),
            Expr::BinaryBoolean(_)
        ));
    }

    #[test]
    fn null_is_unknown_in_boolean_logic() {
        let null = Expr::constant(Constant::Null, Location::default());
        let or = Expr::binary_boolean(BoolOp::Or, null.clone(), Expr::boolean(true, Location::default()));
        assert_eq!(or.reduce_to_constant().unwrap(), Constant::Boolean(true));
        let and = Expr::binary_boolean(BoolOp::And, null, Expr::boolean(true, Location::default()));
        assert_eq!(and.reduce_to_constant().unwrap(), Constant::Null);
    }

    #[test]
    fn paths_never_reduce() {
        let expr = Expr::path(&["user", "id"], Location::default());
        assert!(!expr.can_reduce_to_constant());
        assert!(expr.reduce_to_constant().unwrap_err().is_internal());
    }
}
