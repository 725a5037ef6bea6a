use crate::ast::expressions::{Expr, PathAccessor};
use crate::error::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditAction {
    Include,
    Exclude,
}

impl EditAction {
    pub fn keyword(self) -> &'static str {
        match self {
            EditAction::Include => "INCLUDE",
            EditAction::Exclude => "EXCLUDE",
        }
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One rule of a view.
///
/// ```text
/// include user.sessions where user.sessions.startTime > NOW - DAYS(30)
/// exclude user.sessions.events where user.sessions.events.id in (1, 2)
/// presample(0.1)
/// postsample(1000000) user.sessions
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterRule {
    #[serde(rename = "EDIT_RL")]
    Edit(EditRule),
    #[serde(rename = "PRESAMPLE_RL")]
    Presample(SampleRule),
    #[serde(rename = "POSTSAMPLE_RL")]
    Postsample(SampleRule),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRule {
    pub action: EditAction,
    pub target: PathAccessor,
    #[serde(rename = "where")]
    pub predicate: Expr,
    #[serde(default)]
    pub location: Location,
}

/// A presample ratio or postsample byte budget. Without a written target
/// the rule applies at the root, filled in by bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRule {
    pub amount: Expr,
    #[serde(default)]
    pub target: Option<PathAccessor>,
    #[serde(rename = "where")]
    pub predicate: Expr,
    #[serde(default)]
    pub location: Location,
}

impl FilterRule {
    pub fn target(&self) -> Option<&PathAccessor> {
        match self {
            FilterRule::Edit(r) => Some(&r.target),
            FilterRule::Presample(r) | FilterRule::Postsample(r) => r.target.as_ref(),
        }
    }

    pub fn predicate(&self) -> &Expr {
        match self {
            FilterRule::Edit(r) => &r.predicate,
            FilterRule::Presample(r) | FilterRule::Postsample(r) => &r.predicate,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            FilterRule::Edit(r) => r.location,
            FilterRule::Presample(r) | FilterRule::Postsample(r) => r.location,
        }
    }

    /// Rule kind as written in messages: INCLUDE, EXCLUDE, PRESAMPLE or
    /// POSTSAMPLE.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterRule::Edit(r) => r.action.keyword(),
            FilterRule::Presample(_) => "PRESAMPLE",
            FilterRule::Postsample(_) => "POSTSAMPLE",
        }
    }
}
