//! Indented, human-readable dumps of schemas and syntax trees.
//!
//! Each node prints as `Name(detail` followed by its children one level
//! deeper, closed by `)` at the node's own indentation. Leaves close on
//! the same line:
//!
//! ```text
//! ValueComparisonBooleanExpression(>
//! 	PathAccessor(user.sessions.startTime ValueScalarBinding)
//! 	ByteConstant(10)
//! )
//! ```

use crate::ast::{
    Expr, FilterRule, Funnel, MatchDefinition, PathAccessor, Query, Segment, Select, Source, Statement,
    Statements, StepDefinition, View,
};
use crate::schema::{MotifSchema, Relation, Structure};

pub trait Explain {
    fn explain_at(&self, level: usize) -> String;

    fn explain(&self) -> String {
        self.explain_at(0)
    }
}

fn indent(level: usize) -> String {
    "\t".repeat(level)
}

fn leaf(level: usize, name: &str, detail: impl AsRef<str>) -> String {
    format!("{}{name}({})\n", indent(level), detail.as_ref())
}

fn node(level: usize, name: &str, detail: impl AsRef<str>, children: impl IntoIterator<Item = String>) -> String {
    let mut text = format!("{}{name}({}\n", indent(level), detail.as_ref());
    for child in children {
        text.push_str(&child);
    }
    text.push_str(&indent(level));
    text.push_str(")\n");
    text
}

fn optional(level: usize, label: &str, expr: Option<&Expr>) -> Option<String> {
    expr.map(|e| node(level, label, "", [e.explain_at(level + 1)]))
}

// ----------------------------------------------------------------------------
// Schemas
// ----------------------------------------------------------------------------

impl Explain for Relation {
    fn explain_at(&self, level: usize) -> String {
        let mut detail = format!("{}:{}:", self.number, self.name);
        match (&self.reference, self.key_dtype) {
            (Some(reference), _) => detail.push_str(reference),
            (None, Some(key)) => detail.push_str(&format!("{key}->{}", self.dtype)),
            (None, None) => detail.push_str(&self.dtype.to_string()),
        }
        detail.push_str(&format!(" {}", self.rtype));
        for classifier in &self.classifiers {
            detail.push_str(&format!(" {}", classifier.keyword()));
        }
        leaf(level, "Relation", detail)
    }
}

impl Explain for Structure {
    fn explain_at(&self, level: usize) -> String {
        let detail = match &self.parent {
            Some(parent) => format!("'{}' extends '{parent}'", self.name),
            None => format!("'{}'", self.name),
        };
        node(level, "Structure", detail, self.relations.iter().map(|r| r.explain_at(level + 1)))
    }
}

impl Explain for MotifSchema {
    fn explain_at(&self, level: usize) -> String {
        let root = format!(
            "{}root: '{}':{}\n",
            indent(level + 1),
            self.root_field,
            self.root_structure
        );
        let structures = self.structures().iter().map(|s| s.explain_at(level + 1));
        node(level, "Schema", format!("'{}'", self.name), std::iter::once(root).chain(structures))
    }
}

// ----------------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------------

impl Explain for PathAccessor {
    fn explain_at(&self, level: usize) -> String {
        let mut detail = self.full_path();
        if let Some(binding) = &self.binding {
            detail.push_str(&format!(" {} {}", binding.explain_name(), binding.path()));
        }
        match &self.key {
            Some(key) => node(level, "PathAccessor", detail, [key.explain_at(level + 1)]),
            None => leaf(level, "PathAccessor", detail),
        }
    }
}

impl Explain for Expr {
    fn explain_at(&self, level: usize) -> String {
        let name = self.node_name();
        let next = level + 1;
        match self {
            Expr::Constant(c) => leaf(level, name, c.value.value_text()),
            Expr::Path(p) => p.explain_at(level),
            Expr::Parameter(p) => {
                let detail = match &p.definition {
                    Some(def) if def.vector => format!("{} vector[{}]", p.name, def.dtype),
                    Some(def) => format!("{} {}", p.name, def.dtype),
                    None => p.name.clone(),
                };
                leaf(level, name, detail)
            }
            Expr::Now(_) => leaf(level, name, ""),
            Expr::Comparison(n) => node(level, name, n.op.to_string(), [n.left.explain_at(next), n.right.explain_at(next)]),
            Expr::BinaryBoolean(n) => node(level, name, n.op.to_string(), [n.left.explain_at(next), n.right.explain_at(next)]),
            Expr::BinaryValue(n) => node(level, name, n.op.to_string(), [n.left.explain_at(next), n.right.explain_at(next)]),
            Expr::Not(n) => node(level, name, "NOT", [n.expr.explain_at(next)]),
            Expr::BooleanValue(n) => node(level, name, "", [n.expr.explain_at(next)]),
            Expr::ExplicitMembership(n) => node(
                level,
                name,
                n.op.to_string(),
                std::iter::once(n.left.explain_at(next)).chain(n.members.iter().map(|m| m.explain_at(next))),
            ),
            Expr::VectorMembership(n) => node(level, name, n.op.to_string(), [n.left.explain_at(next), n.vector.explain_at(next)]),
            Expr::NullTest(n) => node(level, name, n.op.to_string(), [n.expr.explain_at(next)]),
            Expr::Bounds(n) => node(
                level,
                name,
                n.op.to_string(),
                [n.expr.explain_at(next), n.lower.explain_at(next), n.upper.explain_at(next)],
            ),
            Expr::UnaryValue(n) => node(level, name, format!("{:?}", n.op).to_uppercase(), [n.expr.explain_at(next)]),
            Expr::Cast(n) => node(level, name, n.dtype.to_string(), [n.expr.explain_at(next)]),
            Expr::Conversion(n) => node(level, name, n.op.to_string(), [n.expr.explain_at(next)]),
            Expr::Quantum(n) => {
                let detail = match &n.timezone {
                    Some(tz) => format!("{} {tz}", n.op),
                    None => n.op.to_string(),
                };
                node(level, name, detail, [n.expr.explain_at(next)])
            }
            Expr::Aggregation(n) => {
                let detail = match n.size {
                    Some(size) => format!("{}[{size}]", n.op),
                    None => n.op.to_string(),
                };
                let children = std::iter::once(n.expr.explain_at(next))
                    .chain(optional(next, "Scope", n.scope.as_deref()))
                    .chain(optional(next, "Quanta", n.quanta.as_deref()))
                    .chain(optional(next, "Where", n.filter.as_deref()));
                node(level, name, detail, children)
            }
            Expr::Function(call) => node(level, name, &call.name, call.args.iter().map(|a| a.explain_at(next))),
            Expr::Boundary(n) => node(level, name, n.op.to_string(), [n.target.explain_at(next)]),
        }
    }
}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

impl Explain for FilterRule {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let mut children = Vec::new();
        let name = match self {
            FilterRule::Edit(_) => "EditRule",
            FilterRule::Presample(rule) | FilterRule::Postsample(rule) => {
                children.push(node(next, "Amount", "", [rule.amount.explain_at(next + 1)]));
                match self {
                    FilterRule::Presample(_) => "PresampleRule",
                    _ => "PostsampleRule",
                }
            }
        };
        if let Some(target) = self.target() {
            children.push(node(next, "Target", "", [target.explain_at(next + 1)]));
        }
        children.push(node(next, "Where", "", [self.predicate().explain_at(next + 1)]));
        node(level, name, self.kind(), children)
    }
}

impl Explain for View {
    fn explain_at(&self, level: usize) -> String {
        node(level, "View", format!("'{}'", self.name), self.rules.iter().map(|r| r.explain_at(level + 1)))
    }
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

fn sources(level: usize, sources: &[Source]) -> String {
    let items = sources.iter().map(|source| {
        let kind = match source {
            Source::Schema(_) => "SchemaSource",
            Source::Funnel(_) => "FunnelSource",
            Source::Segment(_) => "SegmentSource",
        };
        let detail = match source.alias() {
            Some(alias) => format!("{} AS {alias}", source.name()),
            None => source.name().to_string(),
        };
        match source {
            Source::Funnel(s) | Source::Segment(s) if !s.args.is_empty() => {
                node(level + 1, kind, detail, s.args.iter().map(|a| a.explain_at(level + 2)))
            }
            _ => leaf(level + 1, kind, detail),
        }
    });
    node(level, "Sources", "", items)
}

fn parameters(level: usize, parameters: &[crate::ast::ParameterDefinition]) -> Option<String> {
    if parameters.is_empty() {
        return None;
    }
    let items = parameters.iter().map(|p| {
        let dtype = match p.vector {
            true => format!("vector[{}]", p.dtype),
            false => p.dtype.to_string(),
        };
        leaf(level + 1, "ParameterDefinition", format!("{}: {dtype}", p.name))
    });
    Some(node(level, "Parameters", "", items))
}

fn limit(level: usize, limit: Option<i64>) -> Option<String> {
    limit.map(|n| leaf(level, "Limit", n.to_string()))
}

impl Explain for Select {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let targets = self
            .targets
            .iter()
            .map(|t| node(next, "Target", &t.name, [t.expr.explain_at(next + 1)]));
        let children = targets
            .chain(optional(next, "Where", self.filter.as_ref()))
            .chain(limit(next, self.limit));
        node(level, "Select", &self.name, children)
    }
}

impl Explain for Query {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let children = parameters(next, &self.parameters)
            .into_iter()
            .chain(self.selects.iter().map(|s| s.explain_at(next)))
            .chain([sources(next, &self.sources)])
            .chain(optional(next, "Where", self.filter.as_ref()))
            .chain(limit(next, self.limit));
        node(level, "Query", "", children)
    }
}

impl Explain for Segment {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let definitions = self
            .definitions
            .iter()
            .map(|d| node(next, "SegmentDefinition", &d.id, [d.predicate.explain_at(next + 1)]));
        let children = parameters(next, &self.parameters)
            .into_iter()
            .chain(definitions)
            .chain([sources(next, &self.sources)]);
        node(level, "Segment", format!("'{}'", self.name), children)
    }
}

impl Explain for StepDefinition {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let children = [
            optional(next, "When", Some(&self.when)),
            optional(next, "Timing", self.timing.as_ref()),
            optional(next, "After", self.after.as_ref()),
            optional(next, "Within", self.within.as_ref()),
        ];
        node(level, "StepDefinition", self.id.to_string(), children.into_iter().flatten())
    }
}

impl Explain for MatchDefinition {
    fn explain_at(&self, level: usize) -> String {
        let capture = if self.capture() { "" } else { " non-capture" };
        match self {
            MatchDefinition::Step(step) => leaf(level, "MatchStep", format!("{}{capture}", step.id)),
            MatchDefinition::Bracket(bracket) => {
                let ids = bracket.steps.iter().map(|s| s.id.to_string()).collect::<Vec<_>>();
                let negated = if bracket.negated { "^" } else { "" };
                leaf(level, "MatchBracket", format!("{negated}{}{capture}", ids.join(" ")))
            }
            MatchDefinition::Repeat(repeat) => {
                let max = repeat.max.map(|m| m.to_string()).unwrap_or_else(|| "*".to_string());
                node(
                    level,
                    "MatchRepeat",
                    format!("{}:{max}{capture}", repeat.min),
                    [repeat.definition.explain_at(level + 1)],
                )
            }
            MatchDefinition::List(list) => node(
                level,
                "MatchList",
                format!("{}{capture}", format!("{:?}", list.op).to_uppercase()),
                list.items.iter().map(|i| i.explain_at(level + 1)),
            ),
        }
    }
}

impl Explain for Funnel {
    fn explain_at(&self, level: usize) -> String {
        let next = level + 1;
        let children = parameters(next, &self.parameters)
            .into_iter()
            .chain(optional(next, "Within", self.within.as_ref()))
            .chain(limit(next, self.limit))
            .chain(self.steps.iter().map(|s| s.explain_at(next)))
            .chain([self.definition.explain_at(next), sources(next, &self.sources)]);
        node(
            level,
            "Funnel",
            format!("'{}' {}", self.name, self.funnel_type.keyword()),
            children,
        )
    }
}

impl Explain for Statement {
    fn explain_at(&self, level: usize) -> String {
        match self {
            Statement::Query(q) => q.explain_at(level),
            Statement::Segment(s) => s.explain_at(level),
            Statement::Funnel(f) => f.explain_at(level),
        }
    }
}

impl Explain for Statements {
    fn explain_at(&self, level: usize) -> String {
        node(level, "Statements", "", self.statements.iter().map(|s| s.explain_at(level + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn children_are_indented_by_tabs() {
        let expr = Parser::new("a.b > 10").and_then(|mut p| p.parse_expression()).unwrap();
        assert_eq!(
            expr.explain(),
            "ValueComparisonBooleanExpression(>\n\tPathAccessor(a.b)\n\tByteConstant(10)\n)\n"
        );
    }

    #[test]
    fn match_definitions_show_repeats() {
        let text = "funnel f { step 1 when a.b == 1 step 2 when a.b == 2 1 : {2}* } from schema quo";
        let statements = Parser::new(text).and_then(|mut p| p.parse_statements()).unwrap();
        let explained = statements.explain();
        assert!(explained.contains("\t\tMatchList(AND\n"));
        assert!(explained.contains("MatchRepeat(0:*\n"));
        assert!(explained.contains("MatchStep(2 non-capture)"));
    }
}
