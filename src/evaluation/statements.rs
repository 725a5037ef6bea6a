//! Queries, segments and funnels.
//!
//! Every statement runs in its own scope pushed above the session scope:
//!
//! ```text
//! push scope -> bind -> validate(root path) -> optimize -> pop scope
//! ```
//!
//! Funnels and segments define themselves one scope down, in the session
//! scope, so the statements after them can name them as sources.

use crate::ast::statements::{MatchOp, SchemaSource, StatementSource};
use crate::ast::{
    Constant, Expr, Funnel, MatchDefinition, ParameterDefinition, PathAccessor, Query, Segment,
    SegmentDefinition, Select, Source, Statement, Statements, StepDefinition, Target,
};
use crate::datatype::{DataType, decode_integer};
use crate::error::{Location, Result};
use crate::evaluation::binding::bind_path;
use crate::evaluation::{EvalStack, Evaluation, Frame, fail};
use crate::path::Path;
use crate::schema::MotifSchema;
use crate::symbols::{Context, Definition, PathSymbols, SourceSignature, TargetDefinition};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Run one statement through the pipeline in a fresh scope, evaluating at
/// the root of the schema it names.
pub fn finalize_statement<T: Evaluation>(
    mut statement: T,
    symbols: &mut PathSymbols,
    stack: &mut EvalStack,
) -> Result<T> {
    symbols.push_scope();
    statement.bind(symbols, stack)?;
    let root = Path::Schema(symbols.current_root_path()?);
    statement.validate(symbols, &root, stack)?;
    let statement = statement.optimize(symbols)?;
    symbols.pop_scope()?;
    Ok(statement)
}

impl Statements {
    /// Finalize every statement in order.
    pub fn finalize(mut self, symbols: &mut PathSymbols) -> Result<Statements> {
        let mut stack = EvalStack::default();
        stack.push(Frame::Statements);
        let statements = std::mem::take(&mut self.statements);
        for statement in statements {
            let statement = finalize_statement(statement, symbols, &mut stack)?;
            self.statements.push(statement);
        }
        stack.pop()?;
        debug!(statements = self.statements.len(), "statements finalized");
        Ok(self)
    }
}

impl Evaluation for Statement {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        match self {
            Statement::Query(q) => q.bind(symbols, stack),
            Statement::Segment(s) => s.bind(symbols, stack),
            Statement::Funnel(f) => f.bind(symbols, stack),
        }
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        match self {
            Statement::Query(q) => q.validate(symbols, scope, stack),
            Statement::Segment(s) => s.validate(symbols, scope, stack),
            Statement::Funnel(f) => f.validate(symbols, scope, stack),
        }
    }

    fn optimize(self, symbols: &mut PathSymbols) -> Result<Statement> {
        Ok(match self {
            Statement::Query(q) => Statement::Query(q.optimize(symbols)?),
            Statement::Segment(s) => Statement::Segment(s.optimize(symbols)?),
            Statement::Funnel(f) => Statement::Funnel(f.optimize(symbols)?),
        })
    }
}

// ----------------------------------------------------------------------------
// Parameters and sources
// ----------------------------------------------------------------------------

fn bind_parameters(parameters: &[ParameterDefinition], symbols: &mut PathSymbols) -> Result<()> {
    for parameter in parameters {
        symbols
            .add_current(Context::Parameter, Definition::Parameter(parameter.clone()))
            .or_else(|message| fail(parameter.location, message))?;
    }
    Ok(())
}

/// Make the single schema source current and register every source under
/// its name and alias. Returns the statement's schema.
fn bind_sources(
    sources: &mut [Source],
    location: Location,
    symbols: &mut PathSymbols,
    stack: &mut EvalStack,
) -> Result<Arc<MotifSchema>> {
    let schema_sources: Vec<&SchemaSource> = sources
        .iter()
        .filter_map(|s| match s {
            Source::Schema(schema) => Some(schema),
            _ => None,
        })
        .collect();
    let [schema_source] = schema_sources.as_slice() else {
        return fail(location, "query must have one schema source");
    };
    let schema_source = (*schema_source).clone();
    let schema = symbols
        .set_current_root_path(&schema_source.name)
        .or_else(|message| fail(schema_source.location, message))?;
    trace!(schema = %schema.name, "statement schema");

    for source in sources.iter_mut() {
        let definition = match source {
            Source::Schema(_) => Definition::Schema(schema.clone()),
            Source::Funnel(s) => {
                let Some(signature) = symbols.funnel(&s.name) else {
                    return fail(s.location, format!("funnel {} not found", s.name));
                };
                bind_arguments(s, &signature, "funnel", &schema, symbols, stack)?;
                Definition::Funnel(signature)
            }
            Source::Segment(s) => {
                let Some(signature) = symbols.segment(&s.name) else {
                    return fail(s.location, format!("segment {} not found", s.name));
                };
                bind_arguments(s, &signature, "segment", &schema, symbols, stack)?;
                Definition::Segment(signature)
            }
        };
        let name = source.name().to_string();
        if !matches!(source, Source::Schema(_)) {
            symbols.add_alias(Context::Source, &name, definition.clone());
        }
        if let Some(alias) = source.alias().filter(|a| *a != name) {
            if let Some(previous) = symbols.get_definition(Context::Source, alias) {
                if previous.name() != definition.name() {
                    return fail(
                        source.location(),
                        format!("name {alias} is already defined for source {}", previous.name()),
                    );
                }
            }
            let alias = alias.to_string();
            symbols.add_alias(Context::Source, &alias, definition);
        }
    }
    Ok(schema)
}

fn bind_arguments(
    source: &mut StatementSource,
    signature: &SourceSignature,
    kind: &str,
    schema: &MotifSchema,
    symbols: &mut PathSymbols,
    stack: &mut EvalStack,
) -> Result<()> {
    if !signature.schema.eq_ignore_ascii_case(&schema.name) {
        return fail(
            source.location,
            format!("{kind} schema {} does not match query schema {}", source.name, schema.name),
        );
    }
    if source.args.len() != signature.parameters.len() {
        return fail(source.location, format!("argument count mismatch to {kind} {}", source.name));
    }
    for (arg, parameter) in source.args.iter_mut().zip(&signature.parameters) {
        arg.bind(symbols, stack)?;
        if !matches!(arg, Expr::Parameter(_)) && !arg.can_reduce_to_constant() {
            return fail(
                source.location,
                format!("argument '{}' to {kind} {} must be a parameter or a constant", arg.motif(), source.name),
            );
        }
        let dtype = arg.dtype()?;
        if !DataType::has_common(dtype, parameter.dtype) {
            return fail(
                source.location,
                format!(
                    "argument '{}' to {kind} {} is not compatible with parameter {} of type {}",
                    arg.motif(),
                    source.name,
                    parameter.name,
                    parameter.dtype
                ),
            );
        }
    }
    Ok(())
}

fn optimize_sources(sources: Vec<Source>, symbols: &mut PathSymbols) -> Result<Vec<Source>> {
    sources
        .into_iter()
        .map(|source| {
            Ok(match source {
                Source::Funnel(mut s) => {
                    s.args = optimize_all(s.args, symbols)?;
                    Source::Funnel(s)
                }
                Source::Segment(mut s) => {
                    s.args = optimize_all(s.args, symbols)?;
                    Source::Segment(s)
                }
                schema => schema,
            })
        })
        .collect()
}

fn optimize_all(exprs: Vec<Expr>, symbols: &mut PathSymbols) -> Result<Vec<Expr>> {
    exprs.into_iter().map(|e| e.optimize(symbols)).collect()
}

fn optimize_opt(expr: Option<Expr>, symbols: &mut PathSymbols) -> Result<Option<Expr>> {
    expr.map(|e| e.optimize(symbols)).transpose()
}

fn check_limit(limit: Option<i64>, location: Location) -> Result<()> {
    match limit {
        Some(limit) if limit <= 0 => fail(location, format!("limit '{limit}' is not a positive integer")),
        _ => Ok(()),
    }
}

fn check_predicate(what: &str, predicate: &Expr, location: Location) -> Result<()> {
    if matches!(predicate.dtype()?, DataType::Boolean | DataType::Null) {
        return Ok(());
    }
    fail(
        location,
        format!("{what} where expression '{}' must be a boolean", predicate.motif()),
    )
}

/// The shape a funnel or segment exposes to the statements that source it.
fn signature(name: &str, schema: &MotifSchema, parameters: &[ParameterDefinition]) -> Arc<SourceSignature> {
    Arc::new(SourceSignature {
        name: name.to_string(),
        schema: schema.name.clone(),
        parameters: parameters.to_vec(),
    })
}

// ----------------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------------

impl Evaluation for Query {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        bind_parameters(&self.parameters, symbols)?;
        bind_sources(&mut self.sources, self.location, symbols, stack)?;
        stack.framed(Frame::Query, |stack| {
            if let Some(filter) = self.filter.as_mut() {
                filter.bind(symbols, stack)?;
            }
            self.selects.iter_mut().try_for_each(|select| select.bind(symbols, stack))
        })
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Query, |stack| {
            for select in &mut self.selects {
                select.validate(symbols, scope, stack)?;
            }
            if let Some(filter) = self.filter.as_mut() {
                filter.validate(symbols, scope, stack)?;
                check_predicate("query", filter, self.location)?;
            }
            Ok(())
        })?;
        check_limit(self.limit, self.location)
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<Query> {
        self.sources = optimize_sources(self.sources, symbols)?;
        self.selects = self
            .selects
            .into_iter()
            .map(|select| select.optimize(symbols))
            .collect::<Result<Vec<_>>>()?;
        self.filter = optimize_opt(self.filter, symbols)?;
        Ok(self)
    }
}

impl Evaluation for Select {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        symbols.push_scope();
        stack.framed(Frame::Select, |stack| {
            for target in &mut self.targets {
                target.bind(symbols, stack)?;
                let definition = TargetDefinition {
                    name: target.name.clone(),
                    dtype: target.expr.dtype()?,
                };
                symbols
                    .add_current(Context::Target, Definition::Target(definition))
                    .or_else(|message| fail(target.location, message))?;
            }
            match self.filter.as_mut() {
                Some(filter) => filter.bind(symbols, stack),
                None => Ok(()),
            }
        })?;
        self.scope = Some(symbols.pop_scope()?);
        Ok(())
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        self.enter_scope(symbols)?;
        stack.framed(Frame::Select, |stack| {
            for target in &mut self.targets {
                target.validate(symbols, scope, stack)?;
            }
            if let Some(filter) = self.filter.as_mut() {
                filter.validate(symbols, scope, stack)?;
                check_predicate("select", filter, self.location)?;
            }
            check_limit(self.limit, self.location)
        })?;
        self.scope = Some(symbols.pop_scope()?);
        Ok(())
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<Select> {
        self.enter_scope(symbols)?;
        self.targets = self
            .targets
            .into_iter()
            .map(|target| target.optimize(symbols))
            .collect::<Result<Vec<_>>>()?;
        self.filter = optimize_opt(self.filter, symbols)?;
        self.scope = Some(symbols.pop_scope()?);
        Ok(self)
    }
}

impl Select {
    fn enter_scope(&self, symbols: &mut PathSymbols) -> Result<()> {
        match self.scope {
            Some(handle) => symbols.restore_scope(handle),
            None => fail(self.location, format!("select '{}' has not been bound", self.name)),
        }
    }
}

impl Evaluation for Target {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Target, |stack| self.expr.bind(symbols, stack))
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Target, |stack| self.expr.validate(symbols, scope, stack))
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<Target> {
        self.expr = self.expr.optimize(symbols)?;
        Ok(self)
    }
}

// ----------------------------------------------------------------------------
// Segments
// ----------------------------------------------------------------------------

impl Evaluation for Segment {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        bind_parameters(&self.parameters, symbols)?;
        let schema = bind_sources(&mut self.sources, self.location, symbols, stack)?;
        stack.framed(Frame::Segment, |stack| {
            for definition in &mut self.definitions {
                stack.framed(Frame::SegmentDefinition, |stack| definition.predicate.bind(symbols, stack))?;
            }
            Ok(())
        })?;
        symbols
            .add_parent(
                Context::Source,
                Definition::Segment(signature(&self.name, &schema, &self.parameters)),
            )
            .or_else(|message| fail(self.location, message))
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        let mut seen = HashSet::new();
        stack.framed(Frame::Segment, |stack| {
            for definition in &mut self.definitions {
                stack.framed(Frame::SegmentDefinition, |stack| {
                    validate_segment_definition(definition, symbols, scope, stack)
                })?;
                if !seen.insert(definition.id.clone()) {
                    return fail(
                        definition.location,
                        format!("segment identifier '{}' is defined more than once", definition.id),
                    );
                }
            }
            Ok(())
        })
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<Segment> {
        self.sources = optimize_sources(self.sources, symbols)?;
        self.definitions = self
            .definitions
            .into_iter()
            .map(|mut definition| {
                definition.predicate = definition.predicate.optimize(symbols)?;
                Ok(definition)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }
}

fn validate_segment_definition(
    definition: &mut SegmentDefinition,
    symbols: &mut PathSymbols,
    scope: &Path,
    stack: &mut EvalStack,
) -> Result<()> {
    if decode_integer(&definition.id).is_none() {
        return fail(
            definition.location,
            format!("segment identifier '{}' must be a long", definition.id),
        );
    }
    definition.predicate.validate(symbols, scope, stack)?;
    check_predicate("segment definition", &definition.predicate, definition.location)
}

// ----------------------------------------------------------------------------
// Funnels
// ----------------------------------------------------------------------------

impl Evaluation for Funnel {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        bind_parameters(&self.parameters, symbols)?;
        let schema = bind_sources(&mut self.sources, self.location, symbols, stack)?;
        stack.framed(Frame::Funnel, |stack| {
            for step in &mut self.steps {
                step.bind(symbols, stack)?;
            }
            match self.within.as_mut() {
                Some(within) => within.bind(symbols, stack),
                None => Ok(()),
            }
        })?;
        symbols
            .add_parent(
                Context::Source,
                Definition::Funnel(signature(&self.name, &schema, &self.parameters)),
            )
            .or_else(|message| fail(self.location, message))
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        check_limit(self.limit, self.location)?;
        let location = self.location;
        stack.framed(Frame::Funnel, |stack| {
            let mut ids = HashSet::new();
            for step in &mut self.steps {
                if !ids.insert(step.id) {
                    return fail(step.location, format!("Step {} is defined more than once", step.id));
                }
                step.validate(symbols, scope, stack)?;
            }
            if let Some(within) = self.within.as_mut() {
                within.validate(symbols, scope, stack)?;
                check_duration("funnel within", within, location)?;
            }
            Ok(())
        })?;
        validate_match(&self.definition, &self.steps)
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<Funnel> {
        self.sources = optimize_sources(self.sources, symbols)?;
        self.steps = self
            .steps
            .into_iter()
            .map(|step| step.optimize(symbols))
            .collect::<Result<Vec<_>>>()?;
        self.within = optimize_opt(self.within, symbols)?;
        Ok(self)
    }
}

impl Evaluation for StepDefinition {
    fn bind(&mut self, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Step, |stack| {
            self.when.bind(symbols, stack)?;
            for clause in [&mut self.timing, &mut self.after, &mut self.within].into_iter().flatten() {
                clause.bind(symbols, stack)?;
            }
            Ok(())
        })
    }

    fn validate(&mut self, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
        stack.framed(Frame::Step, |stack| {
            let location = self.location;
            self.when.validate(symbols, scope, stack)?;
            check_predicate(&format!("step {}", self.id), &self.when, location)?;
            let when_point = self.when.eval_point()?;

            if self.timing.is_none() {
                self.timing = Some(infer_timing(self.id, &when_point, symbols, stack, location)?);
            }
            if let Some(timing) = self.timing.as_mut() {
                timing.validate(symbols, scope, stack)?;
                if !DataType::has_common(timing.dtype()?, DataType::Long) {
                    return fail(
                        location,
                        format!("step {} timing '{}' must be compatible with LONG", self.id, timing.motif()),
                    );
                }
                if timing.eval_point()?.not_on_path(&when_point) {
                    return fail(
                        location,
                        format!(
                            "step {} timing '{}' is not on the same axis as '{}'",
                            self.id,
                            timing.motif(),
                            self.when.motif()
                        ),
                    );
                }
            }
            for (what, clause) in [("after", &mut self.after), ("within", &mut self.within)] {
                if let Some(clause) = clause.as_mut() {
                    clause.validate(symbols, scope, stack)?;
                    check_duration(&format!("step {} {what}", self.id), clause, location)?;
                }
            }
            Ok(())
        })
    }

    fn optimize(mut self, symbols: &mut PathSymbols) -> Result<StepDefinition> {
        self.when = self.when.optimize(symbols)?;
        self.timing = optimize_opt(self.timing, symbols)?;
        self.after = optimize_opt(self.after, symbols)?;
        self.within = optimize_opt(self.within, symbols)?;
        Ok(self)
    }
}

/// The ordering field of the structure `when` is evaluated at.
fn infer_timing(
    id: i64,
    when_point: &Path,
    symbols: &mut PathSymbols,
    stack: &mut EvalStack,
    location: Location,
) -> Result<Expr> {
    let structure_path = when_point.enclosing();
    let field = match (structure_path.as_schema(), symbols.current_schema()) {
        (Some(path), Some(schema)) => schema
            .structure_at(path)
            .and_then(|s| s.ordering_field())
            .map(|relation| {
                let mut components = path.components.clone();
                components.push(relation.name.clone());
                components
            }),
        _ => None,
    };
    let Some(components) = field else {
        return fail(
            location,
            format!("step {id} has no timing and '{structure_path}' has no ordinal or key field to infer it from"),
        );
    };
    let mut accessor = PathAccessor::new(components, location);
    bind_path(&mut accessor, symbols, stack)?;
    trace!(step = id, timing = %accessor.full_path(), "inferred step timing");
    Ok(Expr::Path(accessor))
}

/// A non-negative constant compatible with LONG.
fn check_duration(what: &str, expr: &Expr, location: Location) -> Result<()> {
    let compatible = DataType::has_common(expr.dtype()?, DataType::Long);
    let value = if compatible && expr.can_reduce_to_constant() {
        expr.reduce_to_constant()?
    } else {
        Constant::Null
    };
    match value.as_f64() {
        Some(v) if v >= 0.0 => Ok(()),
        _ => fail(
            location,
            format!("{what} '{}' must be a non-negative constant compatible with LONG", expr.motif()),
        ),
    }
}

fn validate_match(definition: &MatchDefinition, steps: &[StepDefinition]) -> Result<()> {
    let defined: HashSet<i64> = steps.iter().map(|s| s.id).collect();
    check_match(definition, &defined)?;

    let location = definition.location();
    if !definition.capture() {
        return fail(location, "the funnel match definition must capture");
    }
    if let MatchDefinition::List(list) = definition
        && list.op == MatchOp::And
    {
        if list.items.first().is_some_and(|m| !m.capture()) {
            return fail(location, "a funnel match definition cannot start with a non-capturing group");
        }
        if list.items.last().is_some_and(|m| !m.capture()) {
            return fail(location, "a funnel match definition cannot end with a non-capturing group");
        }
    }
    Ok(())
}

fn check_match(definition: &MatchDefinition, defined: &HashSet<i64>) -> Result<()> {
    let undefined = |id: i64, location: Location| fail(location, format!("Step {id} isn't defined"));
    match definition {
        MatchDefinition::Step(step) => {
            if !defined.contains(&step.id) {
                return undefined(step.id, step.location);
            }
        }
        MatchDefinition::Bracket(bracket) => {
            for step in &bracket.steps {
                if !defined.contains(&step.id) {
                    return undefined(step.id, step.location);
                }
            }
        }
        MatchDefinition::Repeat(repeat) => {
            let sane = repeat.min >= 0 && repeat.max.is_none_or(|max| max >= repeat.min && max > 0);
            if !sane {
                let max = repeat.max.map_or("*".to_string(), |m| m.to_string());
                return fail(
                    repeat.location,
                    format!("repeat bounds [{}:{max}] are not valid", repeat.min),
                );
            }
            check_match(&repeat.definition, defined)?;
        }
        MatchDefinition::List(list) => {
            if list.op == MatchOp::Or {
                let capturing = list.items.iter().filter(|m| m.capture()).count();
                if capturing != 0 && capturing != list.items.len() {
                    return fail(
                        list.location,
                        "alternatives cannot mix capturing and non-capturing groups",
                    );
                }
            }
            for item in &list.items {
                check_match(item, defined)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statements::{MatchList, MatchRepeat, MatchStep};

    fn step(id: i64) -> MatchDefinition {
        MatchDefinition::Step(MatchStep { id, capture: true, location: Location::default() })
    }

    fn steps(ids: &[i64]) -> Vec<StepDefinition> {
        ids.iter()
            .map(|&id| StepDefinition {
                id,
                when: Expr::boolean(true, Location::default()),
                timing: None,
                after: None,
                within: None,
                location: Location::default(),
            })
            .collect()
    }

    fn list(op: MatchOp, items: Vec<MatchDefinition>) -> MatchDefinition {
        MatchDefinition::List(MatchList { op, items, capture: true, location: Location::default() })
    }

    #[test]
    fn undefined_steps_are_reported() {
        let definition = list(MatchOp::And, vec![step(1), step(3)]);
        let err = validate_match(&definition, &steps(&[1, 2])).unwrap_err();
        assert_eq!(err.message(), "Step 3 isn't defined");
    }

    #[test]
    fn definitions_cannot_end_without_capture() {
        let mut last = step(2);
        last.set_non_capture();
        let definition = list(MatchOp::And, vec![step(1), last]);
        let err = validate_match(&definition, &steps(&[1, 2])).unwrap_err();
        assert!(err.message().contains("cannot end with a non-capturing group"));
    }

    #[test]
    fn alternatives_agree_on_capture() {
        let mut quiet = step(2);
        quiet.set_non_capture();
        let definition = list(MatchOp::And, vec![step(1), list(MatchOp::Or, vec![step(1), quiet]), step(2)]);
        assert!(validate_match(&definition, &steps(&[1, 2])).is_err());
    }

    #[test]
    fn repeat_bounds_must_be_ordered() {
        let repeat = MatchDefinition::Repeat(MatchRepeat {
            min: 3,
            max: Some(2),
            definition: Box::new(step(1)),
            capture: true,
            location: Location::default(),
        });
        let err = validate_match(&repeat, &steps(&[1])).unwrap_err();
        assert_eq!(err.message(), "repeat bounds [3:2] are not valid");
    }
}
