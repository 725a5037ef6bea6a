//! Views: named sets of target-keyed filter rules, and the algebra that
//! combines them.
//!
//! ```text
//! view 'recent' {
//!     include user where user.flurryId > 0;
//!     include user.sessions where user.sessions.startTime > NOW - DAYS(30);
//!     presample(0.5)
//! }
//! ```
//!
//! The combinators work on effective include predicates: an `exclude p`
//! rule contributes `NOT p`. Rules are matched by the full text of their
//! target path.

use crate::ast::expressions::{Expr, PathAccessor};
use crate::ast::operators::BoolOp;
use crate::ast::rules::{EditAction, EditRule, FilterRule, SampleRule};
use crate::ast::constants::Constant;
use crate::error::{Location, MotifError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct View {
    pub name: String,
    pub rules: Vec<FilterRule>,
    #[serde(default)]
    pub location: Location,
}

impl View {
    /// Assemble a view, enforcing one presample, one postsample and one
    /// edit rule per target path.
    pub fn new(name: impl Into<String>, rules: Vec<FilterRule>, location: Location) -> Result<View> {
        let name = name.into();
        if name.is_empty() {
            return Err(MotifError::parse(location, "View requires a complete name"));
        }

        let mut accepted: Vec<FilterRule> = Vec::with_capacity(rules.len());
        for rule in rules {
            match &rule {
                FilterRule::Presample(_) => {
                    if accepted.iter().any(|r| matches!(r, FilterRule::Presample(_))) {
                        return Err(MotifError::parse(rule.location(), "Only one presample rule is allowed"));
                    }
                }
                FilterRule::Postsample(_) => {
                    if accepted.iter().any(|r| matches!(r, FilterRule::Postsample(_))) {
                        return Err(MotifError::parse(rule.location(), "Only one postsample rule is allowed"));
                    }
                }
                FilterRule::Edit(edit) => {
                    let target = edit.target.full_path();
                    let clash = accepted.iter().any(|r| {
                        matches!(r, FilterRule::Edit(other) if other.target.full_path() == target)
                    });
                    if clash {
                        return Err(MotifError::parse(
                            rule.location(),
                            format!("Only one include rule for the target path '{target}' is allowed"),
                        ));
                    }
                }
            }
            accepted.push(rule);
        }

        Ok(View {
            name,
            rules: accepted,
            location,
        })
    }

    pub fn edit_rules(&self) -> impl Iterator<Item = &EditRule> {
        self.rules.iter().filter_map(|r| match r {
            FilterRule::Edit(e) => Some(e),
            _ => None,
        })
    }

    pub fn presample(&self) -> Option<&SampleRule> {
        self.rules.iter().find_map(|r| match r {
            FilterRule::Presample(s) => Some(s),
            _ => None,
        })
    }

    pub fn postsample(&self) -> Option<&SampleRule> {
        self.rules.iter().find_map(|r| match r {
            FilterRule::Postsample(s) => Some(s),
            _ => None,
        })
    }

    fn edit_rule(&self, target: &str) -> Option<&EditRule> {
        self.edit_rules().find(|r| r.target.full_path() == target)
    }

    /// Targets of both views' edit rules, this view's first, without repeats.
    fn all_targets<'a>(&'a self, other: &'a View) -> Vec<&'a PathAccessor> {
        let mut targets: Vec<&PathAccessor> = Vec::new();
        for rule in self.edit_rules().chain(other.edit_rules()) {
            if !targets.iter().any(|t| t.full_path() == rule.target.full_path()) {
                targets.push(&rule.target);
            }
        }
        targets
    }

    fn sample_rules(&self, other: &View) -> Vec<FilterRule> {
        let pre = self.presample().or(other.presample()).cloned().map(FilterRule::Presample);
        let post = self.postsample().or(other.postsample()).cloned().map(FilterRule::Postsample);
        pre.into_iter().chain(post).collect()
    }

    fn combine(&self, other: &View, name: String, op: BoolOp) -> View {
        // the absorbing constant for `op`: true for OR, false for AND
        let absorbing = op == BoolOp::Or;
        let mut rules = Vec::new();
        for target in self.all_targets(other) {
            let path = target.full_path();
            let left = self.edit_rule(&path).map(effective_predicate);
            let right = other.edit_rule(&path).map(effective_predicate);
            let predicate = match (left, right) {
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (Some(l), Some(r)) => match (constant_truth(&l), constant_truth(&r)) {
                    (Some(b), _) if b == absorbing => l,
                    (Some(_), _) => r,
                    (None, Some(b)) if b == absorbing => r,
                    (None, Some(_)) => l,
                    (None, None) => Expr::binary_boolean(op, l, r),
                },
                (None, None) => continue,
            };
            rules.push(include(target, predicate, self.location));
        }
        rules.extend(self.sample_rules(other));
        View {
            name,
            rules,
            location: self.location,
        }
    }

    /// Union: a rule present on one side is kept; on both sides the
    /// predicates are ORed, a constant true absorbing the other side and a
    /// constant false deferring to it.
    pub fn union_view(&self, other: &View) -> View {
        self.combine(other, format!("{}⋃{}", self.name, other.name), BoolOp::Or)
    }

    /// Intersection, the dual of [`View::union_view`].
    pub fn intersect_view(&self, other: &View) -> View {
        self.combine(other, format!("{}⋂{}", self.name, other.name), BoolOp::And)
    }

    /// Complement: rules targeting the root get their predicate negated;
    /// rules below the root and sample rules are copied unchanged.
    pub fn complement_view(&self) -> View {
        let rules = self
            .rules
            .iter()
            .map(|rule| match rule {
                FilterRule::Edit(edit) if target_is_root(&edit.target) => {
                    include(&edit.target, negate(&effective_predicate(edit)), edit.location)
                }
                other => other.clone(),
            })
            .collect();
        View {
            name: format!("¬{}", self.name),
            rules,
            location: self.location,
        }
    }

    /// The predicate a root instance must pass: the OR of the root include
    /// predicates AND the negation of every root exclude predicate.
    pub fn root_filter_predicate(&self) -> Expr {
        let roots: Vec<&EditRule> = self.edit_rules().filter(|r| target_is_root(&r.target)).collect();

        let includes = roots
            .iter()
            .filter(|r| r.action == EditAction::Include)
            .map(|r| r.predicate.clone())
            .reduce(|l, r| Expr::binary_boolean(BoolOp::Or, l, r));
        let excludes = roots
            .iter()
            .filter(|r| r.action == EditAction::Exclude)
            .map(|r| Expr::not(r.predicate.clone()))
            .reduce(|l, r| Expr::binary_boolean(BoolOp::And, l, r));

        match (includes, excludes) {
            (Some(i), Some(e)) => Expr::binary_boolean(BoolOp::And, i, e),
            (Some(i), None) => i,
            (None, Some(e)) => e,
            (None, None) => Expr::boolean(true, self.location),
        }
    }
}

fn include(target: &PathAccessor, predicate: Expr, location: Location) -> FilterRule {
    FilterRule::Edit(EditRule {
        action: EditAction::Include,
        target: target.clone(),
        predicate,
        location,
    })
}

fn target_is_root(target: &PathAccessor) -> bool {
    match &target.binding {
        Some(binding) => binding.path().is_root(),
        None => target.components.len() == 1,
    }
}

fn effective_predicate(rule: &EditRule) -> Expr {
    match rule.action {
        EditAction::Include => rule.predicate.clone(),
        EditAction::Exclude => negate(&rule.predicate),
    }
}

fn constant_truth(expr: &Expr) -> Option<bool> {
    if !expr.can_reduce_to_constant() {
        return None;
    }
    expr.reduce_to_constant().ok()?.as_bool()
}

/// Logical negation that folds constants and strips a double NOT.
fn negate(expr: &Expr) -> Expr {
    if let Some(b) = constant_truth(expr) {
        return Expr::constant(Constant::Boolean(!b), expr.location());
    }
    match expr {
        Expr::Not(inner) => (*inner.expr).clone(),
        other => Expr::not(other.clone()),
    }
}
