//! Filter rules and views.

use crate::ast::rules::SampleRule;
use crate::ast::{Expr, FilterRule, PathAccessor, View};
use crate::datatype::DataType;
use crate::error::{Location, Result};
use crate::evaluation::binding::bind_path;
use crate::evaluation::{EvalStack, Evaluation, Frame, fail};
use crate::path::{Path, lowest};
use crate::symbols::PathSymbols;
use tracing::debug;

impl Evaluation for FilterRule {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Rule, |stack| match self {
            FilterRule::Edit(rule) => {
                bind_path(&mut rule.target, symbols, stack)?;
                rule.predicate.bind(symbols, stack)
            }
            FilterRule::Presample(rule) | FilterRule::Postsample(rule) => {
                rule.amount.bind(symbols, stack)?;
                if rule.target.is_none() {
                    let root = symbols.current_root_path()?;
                    rule.target = Some(PathAccessor::new(root.components, rule.location));
                }
                if let Some(target) = rule.target.as_mut() {
                    bind_path(target, symbols, stack)?;
                }
                rule.predicate.bind(symbols, stack)
            }
        })
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        let kind = self.kind();
        let location = self.location();
        stack.framed(Frame::Rule, |stack| {
            let (target, predicate) = match self {
                FilterRule::Edit(rule) => (&rule.target, &mut rule.predicate),
                FilterRule::Presample(rule) | FilterRule::Postsample(rule) => {
                    rule.amount.validate(symbols, scope, stack)?;
                    let Some(target) = rule.target.as_ref() else {
                        return fail(location, format!("{kind} rule has no target"));
                    };
                    (target, &mut rule.predicate)
                }
            };
            validate_target_where(kind, target, predicate, symbols, stack, location)
        })?;

        match self {
            FilterRule::Presample(rule) => check_ratio(rule),
            FilterRule::Postsample(rule) => check_byte_count(rule),
            FilterRule::Edit(_) => Ok(()),
        }
    }

    fn optimize(self, symbols: &mut PathSymbols) -> Result<FilterRule> {
        Ok(match self {
            FilterRule::Edit(mut rule) => {
                rule.predicate = rule.predicate.optimize(symbols)?;
                FilterRule::Edit(rule)
            }
            FilterRule::Presample(rule) => FilterRule::Presample(optimize_sample(rule, symbols)?),
            FilterRule::Postsample(rule) => FilterRule::Postsample(optimize_sample(rule, symbols)?),
        })
    }
}

fn validate_target_where(
    kind: &str,
    target: &PathAccessor,
    predicate: &mut Expr,
    symbols: &mut PathSymbols,
    stack: &mut EvalStack,
    location: Location,
) -> Result<()> {
    let binding = target.bound()?;
    if !binding.is_instance() {
        return fail(
            location,
            format!("target path '{}' must be an instance reference", target.full_path()),
        );
    }
    let target_point = binding.path().clone();
    predicate.validate(symbols, &target_point, stack)?;
    if !matches!(predicate.dtype()?, DataType::Boolean | DataType::Null) {
        return fail(
            location,
            format!(
                "{kind} '{}' filter clause where expression '{}' must be a boolean",
                target.full_path(),
                predicate.motif()
            ),
        );
    }
    let where_point = predicate.eval_point()?;
    if lowest([&target_point, &where_point]).is_none() {
        return fail(
            location,
            format!(
                "the target, '{}', and where, '{}', expressions are not on the same axis",
                target.full_path(),
                predicate.motif()
            ),
        );
    }
    Ok(())
}

fn constant_amount(rule: &SampleRule) -> Result<Option<f64>> {
    let numeric = rule.amount.dtype()?.is_numeric();
    if !numeric || !rule.amount.can_reduce_to_constant() {
        return Ok(None);
    }
    Ok(rule.amount.reduce_to_constant()?.as_f64())
}

fn check_ratio(rule: &SampleRule) -> Result<()> {
    match constant_amount(rule)? {
        Some(ratio) if (0.0..=1.0).contains(&ratio) => Ok(()),
        _ => fail(
            rule.location,
            format!(
                "Presample ratio '{}' must evaluate to a numeric constant <= 1.0 and >= 0.0",
                rule.amount.motif()
            ),
        ),
    }
}

fn check_byte_count(rule: &SampleRule) -> Result<()> {
    match constant_amount(rule)? {
        Some(count) if count >= 0.0 => Ok(()),
        _ => fail(
            rule.location,
            format!(
                "Postsample max byte count '{}' must evaluate to a numeric constant >= 0",
                rule.amount.motif()
            ),
        ),
    }
}

fn optimize_sample(mut rule: SampleRule, symbols: &mut PathSymbols) -> Result<SampleRule> {
    rule.amount = rule.amount.optimize(symbols)?;
    rule.predicate = rule.predicate.optimize(symbols)?;
    Ok(rule)
}

impl Evaluation for View {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::View, |stack| {
            self.rules.iter_mut().try_for_each(|rule| rule.bind(symbols, stack))
        })
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::View, |stack| {
            self.rules
                .iter_mut()
                .try_for_each(|rule| rule.validate(symbols, scope, stack))
        })
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<View> {
        self.rules = self
            .rules
            .into_iter()
            .map(|rule| rule.optimize(symbols))
            .collect::<Result<Vec<_>>>()?;
        debug!(view = %self.name, rules = self.rules.len(), "view finalized");
        Ok(self)
    }
}
