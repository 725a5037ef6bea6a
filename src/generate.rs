//! Motif source text from syntax trees.
//!
//! The output reparses to an equal tree. Binary nodes are always
//! parenthesized, so operator precedence never has to be reconstructed.

use crate::ast::expressions::Aggregation;
use crate::ast::statements::{MatchRepeat, MatchStep};
use crate::ast::{
    EditRule, Expr, FilterRule, Funnel, MatchDefinition, ParameterDefinition, PathAccessor, Query,
    SampleRule, Segment, Select, Source, Statement, Statements, StepDefinition, UnaryValueOp, View,
};
use crate::ast::constants::quote_string;
use regex::Regex;
use std::sync::LazyLock;

static BARE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// `name` as written in source: bare when it lexes as an identifier,
/// double-quoted otherwise.
pub fn quote_name(name: &str) -> String {
    let bare = BARE_NAME.as_ref().is_some_and(|re| re.is_match(name))
        && !["true", "false", "null"].contains(&name.to_ascii_lowercase().as_str());
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\"\""))
    }
}

fn join(exprs: &[Expr]) -> String {
    exprs.iter().map(Expr::motif).collect::<Vec<_>>().join(", ")
}

impl PathAccessor {
    pub fn motif(&self) -> String {
        let path = self.full_path();
        match &self.key {
            Some(key) => format!("{path}[{}]", key.motif()),
            None => path,
        }
    }
}

impl Expr {
    /// Source text of the expression.
    pub fn motif(&self) -> String {
        match self {
            Expr::Constant(c) => c.value.motif(),
            Expr::Path(p) => p.motif(),
            Expr::Parameter(p) => match BARE_NAME.as_ref().is_some_and(|re| re.is_match(&p.name)) {
                true => format!("${}", p.name),
                false => format!("${}", quote_string(&p.name)),
            },
            Expr::Comparison(n) => format!("({} {} {})", n.left.motif(), n.op, n.right.motif()),
            Expr::BinaryBoolean(n) => format!("({} {} {})", n.left.motif(), n.op, n.right.motif()),
            Expr::Not(n) => format!("NOT ({})", n.expr.motif()),
            Expr::BooleanValue(n) => n.expr.motif(),
            Expr::ExplicitMembership(n) => {
                format!("({} {} ({}))", n.left.motif(), n.op, join(&n.members))
            }
            Expr::VectorMembership(n) => format!("({} {} {})", n.left.motif(), n.op, n.vector.motif()),
            Expr::NullTest(n) => format!("({} {})", n.expr.motif(), n.op),
            Expr::Bounds(n) => format!(
                "({} {} {} AND {})",
                n.expr.motif(),
                n.op,
                n.lower.motif(),
                n.upper.motif()
            ),
            Expr::BinaryValue(n) => format!("({} {} {})", n.left.motif(), n.op, n.right.motif()),
            Expr::UnaryValue(n) => match n.op {
                UnaryValueOp::Negate => format!("-({})", n.expr.motif()),
                UnaryValueOp::Normal => format!("+({})", n.expr.motif()),
            },
            Expr::Cast(n) => format!("CAST({} AS {})", n.expr.motif(), n.dtype),
            Expr::Now(_) => "NOW".to_string(),
            Expr::Conversion(n) => format!("{}({})", n.op, n.expr.motif()),
            Expr::Quantum(n) => match &n.timezone {
                Some(tz) => format!("{}({}, {})", n.op, n.expr.motif(), quote_string(tz)),
                None => format!("{}({})", n.op, n.expr.motif()),
            },
            Expr::Aggregation(n) => aggregation(n),
            Expr::Function(call) => format!("{}({})", call.name, join(&call.args)),
            Expr::Boundary(n) => format!("{} OF {}", n.op, n.target.motif()),
        }
    }
}

fn aggregation(n: &Aggregation) -> String {
    let mut text = format!("({}", n.op);
    if let Some(size) = n.size {
        text.push_str(&format!("[{size}]"));
    }
    text.push_str(&format!("({})", n.expr.motif()));
    if let Some(scope) = &n.scope {
        text.push_str(&format!(" SCOPE {}", scope.motif()));
    }
    let default_quanta = n
        .quanta
        .as_ref()
        .and_then(|q| q.as_constant())
        .and_then(|c| c.as_i64())
        == Some(1);
    if let Some(quanta) = n.quanta.as_ref().filter(|_| !default_quanta) {
        text.push_str(&format!(" ROLLING {}", quanta.motif()));
    }
    if let Some(filter) = &n.filter {
        text.push_str(&format!(" WHERE ({})", filter.motif()));
    }
    text.push(')');
    text
}

/// ` WHERE p`, or nothing for a constant `true`.
fn where_clause(predicate: &Expr) -> String {
    match predicate.as_constant().and_then(|c| c.as_bool()) {
        Some(true) => String::new(),
        _ => format!(" WHERE {}", predicate.motif()),
    }
}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

impl FilterRule {
    pub fn generate_motif(&self) -> String {
        match self {
            FilterRule::Edit(EditRule { action, target, predicate, .. }) => {
                format!("{action} {}{}", target.motif(), where_clause(predicate))
            }
            FilterRule::Presample(rule) => sample("PRESAMPLE", rule),
            FilterRule::Postsample(rule) => sample("POSTSAMPLE", rule),
        }
    }
}

fn sample(keyword: &str, rule: &SampleRule) -> String {
    let target = rule.target.as_ref().map(|t| format!(" {}", t.motif())).unwrap_or_default();
    format!("{keyword}({}){target}{}", rule.amount.motif(), where_clause(&rule.predicate))
}

impl View {
    pub fn generate_motif(&self) -> String {
        let mut text = format!("VIEW {} {{\n", quote_name(&self.name));
        for rule in &self.rules {
            text.push_str(&format!("    {};\n", rule.generate_motif()));
        }
        text.push('}');
        text
    }
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

fn parameters(parameters: &[ParameterDefinition]) -> String {
    if parameters.is_empty() {
        return String::new();
    }
    let list = parameters
        .iter()
        .map(|p| match p.vector {
            true => format!("{}: vector[{}]", quote_name(&p.name), p.dtype),
            false => format!("{}: {}", quote_name(&p.name), p.dtype),
        })
        .collect::<Vec<_>>();
    format!("({})", list.join(", "))
}

fn sources(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|source| {
            let (keyword, args) = match source {
                Source::Schema(_) => ("SCHEMA", String::new()),
                Source::Funnel(s) => ("FUNNEL", format!("({})", join(&s.args))),
                Source::Segment(s) => ("SEGMENT", format!("({})", join(&s.args))),
            };
            let alias = source.alias().map(|a| format!(" AS {}", quote_name(a))).unwrap_or_default();
            format!("{keyword} {}{args}{alias}", quote_name(source.name()))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn limit(limit: Option<i64>) -> String {
    limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default()
}

impl Select {
    fn generate_body(&self) -> String {
        let targets = self
            .targets
            .iter()
            .map(|t| format!("{} AS {}", t.expr.motif(), quote_name(&t.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let filter = self.filter.as_ref().map(|f| format!(" WHERE {}", f.motif())).unwrap_or_default();
        format!("{targets}{filter}{}", limit(self.limit))
    }
}

impl Query {
    pub fn generate_motif(&self) -> String {
        let mut text = format!("SELECT {}", parameters(&self.parameters));
        if !self.parameters.is_empty() {
            text.push(' ');
        }
        let bodies = self.selects.iter().map(Select::generate_body).collect::<Vec<_>>();
        text.push_str(&bodies.join("\nBESIDE SELECT "));
        text.push_str(&format!("\nFROM {}", sources(&self.sources)));
        if let Some(filter) = &self.filter {
            text.push_str(&format!(" WHERE {}", filter.motif()));
        }
        text.push_str(&limit(self.limit));
        text
    }
}

impl Segment {
    pub fn generate_motif(&self) -> String {
        let mut text = format!("SEGMENT {}{} {{\n", quote_name(&self.name), parameters(&self.parameters));
        for definition in &self.definitions {
            let id = match definition.id.parse::<i64>() {
                Ok(_) => definition.id.clone(),
                Err(_) => quote_name(&definition.id),
            };
            text.push_str(&format!("    SEGMENT {id} WHEN {}\n", definition.predicate.motif()));
        }
        text.push_str(&format!("}} FROM {}", sources(&self.sources)));
        text
    }
}

impl StepDefinition {
    fn generate_motif(&self) -> String {
        let mut text = format!("STEP {} WHEN {}", self.id, self.when.motif());
        if let Some(timing) = &self.timing {
            text.push_str(&format!(" TIMING ON {}", timing.motif()));
        }
        if let Some(after) = &self.after {
            text.push_str(&format!(" AFTER {}", after.motif()));
        }
        if let Some(within) = &self.within {
            text.push_str(&format!(" WITHIN {}", within.motif()));
        }
        text
    }
}

impl MatchDefinition {
    pub fn generate_motif(&self) -> String {
        let body = match self {
            MatchDefinition::Step(MatchStep { id, .. }) => id.to_string(),
            MatchDefinition::Bracket(bracket) => {
                let ids = bracket.steps.iter().map(|s| s.id.to_string()).collect::<Vec<_>>();
                format!("[{}{}]", if bracket.negated { "^" } else { "" }, ids.join(" "))
            }
            MatchDefinition::Repeat(repeat) => repetition(repeat),
            MatchDefinition::List(list) => {
                let separator = match list.op {
                    crate::ast::statements::MatchOp::And => " : ",
                    crate::ast::statements::MatchOp::Or => " | ",
                };
                let items = list.items.iter().map(MatchDefinition::generate_motif).collect::<Vec<_>>();
                let joined = items.join(separator);
                return match list.capture {
                    true => format!("({joined})"),
                    false => format!("{{{joined}}}"),
                };
            }
        };
        if self.capture() { body } else { format!("{{{body}}}") }
    }
}

fn repetition(repeat: &MatchRepeat) -> String {
    let inner = repeat.definition.generate_motif();
    let suffix = match (repeat.min, repeat.max) {
        (0, None) => "*".to_string(),
        (1, None) => "+".to_string(),
        (0, Some(1)) => "?".to_string(),
        (min, Some(max)) => format!("[{min}:{max}]"),
        (min, None) => format!("[{min}:*]"),
    };
    format!("{inner}{suffix}")
}

impl Funnel {
    pub fn generate_motif(&self) -> String {
        let mut text = format!(
            "FUNNEL {}{} {}",
            quote_name(&self.name),
            parameters(&self.parameters),
            self.funnel_type.keyword()
        );
        if let Some(within) = &self.within {
            text.push_str(&format!(" WITHIN {}", within.motif()));
        }
        text.push_str(&limit(self.limit));
        text.push_str(" {\n");
        for step in &self.steps {
            text.push_str(&format!("    {}\n", step.generate_motif()));
        }
        // a leading bracket would read as a map key of the last step's clause
        let definition = match self.definition.generate_motif() {
            m if m.starts_with('[') => format!("({m})"),
            m => m,
        };
        text.push_str(&format!("    {definition}\n"));
        text.push_str(&format!("}} FROM {}", sources(&self.sources)));
        text
    }
}

impl Statement {
    pub fn generate_motif(&self) -> String {
        match self {
            Statement::Query(q) => q.generate_motif(),
            Statement::Segment(s) => s.generate_motif(),
            Statement::Funnel(f) => f.generate_motif(),
        }
    }
}

impl Statements {
    pub fn generate_motif(&self) -> String {
        self.statements
            .iter()
            .map(Statement::generate_motif)
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn regenerate(text: &str) -> (Expr, Expr) {
        let first = Parser::new(text).and_then(|mut p| p.parse_expression()).unwrap();
        let again = Parser::new(&first.motif()).and_then(|mut p| p.parse_expression()).unwrap();
        (first, again)
    }

    #[test]
    fn names_are_quoted_when_needed() {
        assert_eq!(quote_name("users"), "users");
        assert_eq!(quote_name("daily users"), "\"daily users\"");
        assert_eq!(quote_name("null"), "\"null\"");
        assert_eq!(quote_name("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn expressions_reparse_to_the_same_tree() {
        for text in [
            "a.b + 2 * c.d > 10 and not x.y is null",
            "day(user.sessions.startTime, 'UTC') between 1 and 5",
            "count(user.sessions) scope user where user.sessions.id > 3",
            "user.sessions.parameters['campaign'] in ('a', 'b')",
            "-(a.b) <= cast(3.5 as long)",
        ] {
            let (first, again) = regenerate(text);
            assert_eq!(first, again, "{text}");
        }
    }

    #[test]
    fn funnels_reparse_to_the_same_tree() {
        let text = "funnel 'checkout' transaction within days(1) limit 10 {
            step 1 when user.sessions.events.id == 10
            step 2 when user.sessions.events.id == 11 timing on user.sessions.events.time within minutes(5)
            step 3 when user.sessions.events.id == 12
            step 4 when user.sessions.events.id == 13
            (1 : 2*) | {3}+ : [^3 4][2:3] : {4?}
        } from schema quo";
        let first = Parser::new(text).and_then(|mut p| p.parse_statements()).unwrap();
        let generated = first.generate_motif();
        let again = Parser::new(&generated).and_then(|mut p| p.parse_statements()).unwrap();
        assert_eq!(first, again, "{generated}");
    }

    #[test]
    fn views_leave_out_trivial_where_clauses() {
        let text = "view 'recent' { include user; exclude user.sessions where user.sessions.id > 3; presample(0.5) }";
        let view = Parser::new(text).and_then(|mut p| p.parse_view()).unwrap();
        let generated = view.generate_motif();
        assert!(generated.contains("INCLUDE user;"));
        assert!(generated.contains("EXCLUDE user.sessions WHERE (user.sessions.id > 3);"));
        assert!(generated.contains("PRESAMPLE(0.5);"));
        let again = Parser::new(&generated).and_then(|mut p| p.parse_view()).unwrap();
        assert_eq!(view, again);
    }
}
