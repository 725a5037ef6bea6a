//! The entry points: text in, finalized trees and explanations out.
//!
//! ```no_run
//! use motif_lang::Motif;
//!
//! let motif = Motif::new();
//! let schema = motif.parse_schema("schema quo { version : 1 root) user : User structure User { 0) id : long key } }")?;
//! motif.register_schema(schema);
//! let view = motif.parse_view("quo", "view v { include user where user.id > 10 }")?;
//! println!("{}", view.generate_motif());
//! # Ok::<(), motif_lang::MotifError>(())
//! ```

use crate::ast::{Expr, Query, Statements, View};
use crate::catalog::{SchemaCatalog, SchemaLookup};
use crate::config::MotifConfig;
use crate::error::{Location, MotifError, Result};
use crate::evaluation::statements::finalize_statement;
use crate::evaluation::{EvalStack, Evaluation, Frame};
use crate::explain::Explain;
use crate::parser::Parser;
use crate::schema::MotifSchema;
use crate::symbols::PathSymbols;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Motif {
    config: MotifConfig,
    catalog: Arc<SchemaCatalog>,
}

impl Default for Motif {
    fn default() -> Self {
        Motif::new()
    }
}

impl Motif {
    /// A facade over a private, empty catalog with default configuration.
    pub fn new() -> Self {
        Motif::with_catalog(MotifConfig::default(), Arc::new(SchemaCatalog::new()))
    }

    pub fn with_catalog(config: MotifConfig, catalog: Arc<SchemaCatalog>) -> Self {
        Motif { config, catalog }
    }

    /// Environment configuration over the process-wide catalog.
    pub fn from_env() -> Self {
        Motif::with_catalog(MotifConfig::from_env(), SchemaCatalog::global())
    }

    pub fn config(&self) -> &MotifConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    fn parser(&self, source: &str) -> Result<Parser> {
        Ok(Parser::new(source)?.with_max_depth(self.config.max_depth))
    }

    /// A fresh symbol table. Never shared between calls.
    fn symbols(&self) -> PathSymbols {
        let lookup: Arc<dyn SchemaLookup> = self.catalog.clone();
        PathSymbols::new(lookup, self.config.default_time_zone.clone())
    }

    /// Finalize a schema-rooted tree (an expression or a view) against
    /// the schema called `schema`.
    fn finalize_rooted<T: Evaluation>(&self, schema: &str, tree: T, location: Location) -> Result<T> {
        let mut symbols = self.symbols();
        symbols
            .set_current_root_path(schema)
            .map_err(|message| MotifError::parse(location, message))?;
        finalize_statement(tree, &mut symbols, &mut EvalStack::default())
    }

    // ------------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------------

    pub fn parse_schema(&self, source: &str) -> Result<MotifSchema> {
        let mut parser = self.parser(source)?;
        let decl = parser.parse_schema_decl()?;
        parser.finish()?;
        MotifSchema::build(&decl)
    }

    pub fn register_schema(&self, schema: MotifSchema) -> Arc<MotifSchema> {
        self.catalog.register(schema)
    }

    pub fn explain_schema(&self, source: &str) -> Result<String> {
        Ok(self.parse_schema(source)?.explain())
    }

    pub fn is_schema_registered(&self, name: &str) -> bool {
        self.catalog.is_registered(name)
    }

    pub fn get_schema(&self, name: &str) -> Option<Arc<MotifSchema>> {
        self.catalog.get(name)
    }

    // ------------------------------------------------------------------------
    // Expressions and views
    // ------------------------------------------------------------------------

    pub fn parse_expression(&self, schema: &str, source: &str) -> Result<Expr> {
        let mut parser = self.parser(source)?;
        let expr = parser.parse_expression()?;
        parser.finish()?;
        let location = expr.location();
        let expr = self.finalize_rooted(schema, expr, location)?;
        debug!(schema, expr = %expr.motif(), "expression finalized");
        Ok(expr)
    }

    pub fn explain_expression(&self, schema: &str, source: &str) -> Result<String> {
        Ok(self.parse_expression(schema, source)?.explain())
    }

    pub fn parse_view(&self, schema: &str, source: &str) -> Result<View> {
        let mut parser = self.parser(source)?;
        let view = parser.parse_view()?;
        parser.finish()?;
        let location = view.location;
        self.finalize_rooted(schema, view, location)
    }

    pub fn explain_view(&self, schema: &str, source: &str) -> Result<String> {
        Ok(self.parse_view(schema, source)?.explain())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    /// A single query. Its schema comes from its own `FROM` clause.
    pub fn parse_motif_query(&self, source: &str) -> Result<Query> {
        let mut parser = self.parser(source)?;
        let query = parser.parse_query()?;
        parser.finish()?;
        let mut symbols = self.symbols();
        let mut stack = EvalStack::default();
        stack.framed(Frame::Statements, |stack| finalize_statement(query, &mut symbols, stack))
    }

    /// Queries, funnels and segments, in order. Funnels and segments are
    /// visible as sources to the statements after them.
    pub fn parse_motif_statements(&self, source: &str) -> Result<Statements> {
        let mut parser = self.parser(source)?;
        let statements = parser.parse_statements()?;
        parser.finish()?;
        statements.finalize(&mut self.symbols())
    }

    pub fn explain_motif(&self, source: &str) -> Result<String> {
        Ok(self.parse_motif_statements(source)?.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "schema quo {
        version : 1
        root) user : User
        structure User {
            0) id : long key
            1) sessions : vector(Session)
        }
        structure Session {
            0) startTime : long ordinal
        }
    }";

    fn motif() -> Motif {
        let motif = Motif::new();
        let schema = motif.parse_schema(SCHEMA).unwrap();
        motif.register_schema(schema);
        motif
    }

    #[test]
    fn schemas_register_case_insensitively() {
        let motif = motif();
        assert!(motif.is_schema_registered("quo"));
        assert!(motif.is_schema_registered("QUO"));
        assert!(!motif.is_schema_registered("other"));
        assert_eq!(motif.get_schema("quo").unwrap().root_field, "user");
    }

    #[test]
    fn unknown_schemas_are_parse_errors() {
        let result = motif().parse_expression("nope", "user.id > 1");
        assert!(matches!(result, Err(MotifError::Parse { .. })));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let result = motif().parse_expression("quo", "user.id > 1 )");
        assert!(matches!(result, Err(MotifError::Parse { .. })));
    }

    #[test]
    fn explain_schema_lists_structures() {
        let text = motif().explain_schema(SCHEMA).unwrap();
        assert!(text.starts_with("Schema('quo'\n\troot: 'user':User\n"));
        assert!(text.contains("\tStructure('Session'\n"));
    }
}
