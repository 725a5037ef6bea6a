//! Scoped symbol table used by bind, validate and optimize.
//!
//! Scopes live in an arena and are addressed by [`ScopeHandle`]. The active
//! stack holds handles, so a popped scope stays alive and a select can
//! re-enter the scope it bound in when it is later validated and optimized.
//!
//! ```text
//! scope 0   global: built-in functions, schema aliases
//! scope 1   session: funnels and segments registered by earlier statements
//! scope 2.. statement scopes, pushed and popped per statement and select
//! ```

use crate::ast::expressions::FunctionKind;
use crate::ast::statements::ParameterDefinition;
use crate::catalog::SchemaLookup;
use crate::datatype::DataType;
use crate::error::{MotifError, Result};
use crate::path::{FunnelPath, Path, SchemaPath, SegmentPath, form_funnel_path, form_segment_path};
use crate::schema::{MotifSchema, SchemaResolution};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Namespace a name is defined in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Function,
    Parameter,
    Source,
    Funnel,
    Segment,
    Alias,
    Schema,
    Target,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Context::Function => "FUNCTION",
            Context::Parameter => "PARAMETER",
            Context::Source => "SOURCE",
            Context::Funnel => "FUNNEL",
            Context::Segment => "SEGMENT",
            Context::Alias => "ALIAS",
            Context::Schema => "SCHEMA",
            Context::Target => "TARGET",
        })
    }
}

/// The externally visible shape of a funnel or segment, as seen by the
/// statements that use it as a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSignature {
    pub name: String,
    pub schema: String,
    pub parameters: Vec<ParameterDefinition>,
}

/// A select target, visible to the select's own predicate by name.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDefinition {
    pub name: String,
    pub dtype: DataType,
}

#[derive(Debug, Clone)]
pub enum Definition {
    Schema(Arc<MotifSchema>),
    Funnel(Arc<SourceSignature>),
    Segment(Arc<SourceSignature>),
    Parameter(ParameterDefinition),
    Function(FunctionKind),
    Target(TargetDefinition),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Schema(s) => &s.name,
            Definition::Funnel(s) | Definition::Segment(s) => &s.name,
            Definition::Parameter(p) => &p.name,
            Definition::Function(f) => f.name(),
            Definition::Target(t) => &t.name,
        }
    }
}

/// Handle of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeHandle(usize);

#[derive(Debug, Default)]
struct Scope {
    entries: HashMap<(Context, String), Definition>,
}

/// What the head of a dotted path resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResolution {
    Schema(SchemaResolution),
    Funnel(FunnelPath),
    Segment(SegmentPath),
}

impl PathResolution {
    pub fn path(&self) -> Path {
        match self {
            PathResolution::Schema(r) => Path::Schema(r.path.clone()),
            PathResolution::Funnel(p) => Path::Funnel(p.clone()),
            PathResolution::Segment(p) => Path::Segment(p.clone()),
        }
    }
}

const PERMANENT_SCOPES: usize = 2;

pub struct PathSymbols {
    lookup: Arc<dyn SchemaLookup>,
    default_time_zone: String,
    scopes: Vec<Scope>,
    active: Vec<usize>,
    schema_name: Option<String>,
}

impl fmt::Debug for PathSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSymbols")
            .field("scopes", &self.scopes.len())
            .field("active", &self.active)
            .field("schema_name", &self.schema_name)
            .finish()
    }
}

impl PathSymbols {
    pub fn new(lookup: Arc<dyn SchemaLookup>, default_time_zone: impl Into<String>) -> Self {
        let mut symbols = PathSymbols {
            lookup,
            default_time_zone: default_time_zone.into(),
            scopes: Vec::new(),
            active: Vec::new(),
            schema_name: None,
        };

        symbols.push_scope();
        for function in FunctionKind::ALL {
            symbols.add_alias(Context::Function, &function.name().to_ascii_lowercase(), Definition::Function(function));
        }
        for alias in symbols.lookup.all_schema_aliases() {
            if let Some(schema) = symbols.lookup.lookup_schema(&alias) {
                let name = schema.name.clone();
                symbols.add_alias(Context::Schema, &alias, Definition::Schema(schema.clone()));
                symbols.add_alias(Context::Schema, &alias.to_lowercase(), Definition::Schema(schema.clone()));
                symbols.add_alias(Context::Schema, &name, Definition::Schema(schema));
            }
        }
        symbols.push_scope();
        symbols
    }

    pub fn default_time_zone(&self) -> &str {
        &self.default_time_zone
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
        self.active.push(self.scopes.len() - 1);
    }

    /// Leave the current scope, keeping it in the arena for a later
    /// [`PathSymbols::restore_scope`]. The global and session scopes are
    /// never popped.
    pub fn pop_scope(&mut self) -> Result<ScopeHandle> {
        if self.active.len() <= PERMANENT_SCOPES {
            return Err(MotifError::internal("attempt to pop a permanent scope"));
        }
        self.active
            .pop()
            .map(ScopeHandle)
            .ok_or_else(|| MotifError::internal("scope stack is empty"))
    }

    pub fn restore_scope(&mut self, handle: ScopeHandle) -> Result<()> {
        if handle.0 >= self.scopes.len() {
            return Err(MotifError::internal(format!("unknown scope handle {}", handle.0)));
        }
        self.active.push(handle.0);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    fn insert(&mut self, index: usize, context: Context, name: &str, definition: Definition) -> std::result::Result<(), String> {
        match self.scopes[index].entries.entry((context, name.to_string())) {
            Entry::Occupied(_) => Err(format!("{context} named '{name}' has already been defined")),
            Entry::Vacant(slot) => {
                slot.insert(definition);
                Ok(())
            }
        }
    }

    /// Define `definition` in the innermost scope.
    pub fn add_current(&mut self, context: Context, definition: Definition) -> std::result::Result<(), String> {
        let index = *self.active.last().ok_or("scope stack is empty")?;
        let name = definition.name().to_string();
        trace!(%context, %name, "define");
        self.insert(index, context, &name, definition)
    }

    /// Define `definition` one scope below the innermost one, so it outlives
    /// the statement defining it.
    pub fn add_parent(&mut self, context: Context, definition: Definition) -> std::result::Result<(), String> {
        let index = match self.active.len() {
            0 => return Err("scope stack is empty".to_string()),
            1 => self.active[0],
            n => self.active[n - 2],
        };
        let name = definition.name().to_string();
        trace!(%context, %name, "define in parent scope");
        self.insert(index, context, &name, definition)
    }

    /// Define or overwrite `alias` in the innermost scope.
    pub fn add_alias(&mut self, context: Context, alias: &str, definition: Definition) {
        if let Some(&index) = self.active.last() {
            self.scopes[index].entries.insert((context, alias.to_string()), definition);
        }
    }

    /// Innermost definition of `name` in `context`.
    pub fn get_definition(&self, context: Context, name: &str) -> Option<&Definition> {
        let key = (context, name.to_string());
        self.active
            .iter()
            .rev()
            .find_map(|&index| self.scopes[index].entries.get(&key))
    }

    pub fn function(&self, name: &str) -> Option<FunctionKind> {
        match self.get_definition(Context::Function, &name.to_ascii_lowercase()) {
            Some(Definition::Function(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        match self.get_definition(Context::Parameter, name) {
            Some(Definition::Parameter(p)) => Some(p),
            _ => None,
        }
    }

    pub fn target(&self, name: &str) -> Option<&TargetDefinition> {
        match self.get_definition(Context::Target, name) {
            Some(Definition::Target(t)) => Some(t),
            _ => None,
        }
    }

    pub fn funnel(&self, name: &str) -> Option<Arc<SourceSignature>> {
        [Context::Source, Context::Funnel]
            .into_iter()
            .find_map(|context| match self.get_definition(context, name) {
                Some(Definition::Funnel(f)) => Some(f.clone()),
                _ => None,
            })
    }

    pub fn segment(&self, name: &str) -> Option<Arc<SourceSignature>> {
        [Context::Source, Context::Segment]
            .into_iter()
            .find_map(|context| match self.get_definition(context, name) {
                Some(Definition::Segment(s)) => Some(s.clone()),
                _ => None,
            })
    }

    pub fn lookup_schema(&self, name: &str) -> Option<Arc<MotifSchema>> {
        match self.get_definition(Context::Schema, name) {
            Some(Definition::Schema(s)) => Some(s.clone()),
            _ => self.lookup.lookup_schema(name),
        }
    }

    /// Make `name` the schema of the current statement, reachable as a
    /// source through both its root field name and `name`.
    pub fn set_current_root_path(&mut self, name: &str) -> std::result::Result<Arc<MotifSchema>, String> {
        let schema = self
            .lookup_schema(name)
            .ok_or_else(|| format!("schema '{name}' is not defined"))?;
        self.add_alias(Context::Source, &schema.root_field, Definition::Schema(schema.clone()));
        self.add_alias(Context::Source, name, Definition::Schema(schema.clone()));
        self.add_alias(Context::Schema, name, Definition::Schema(schema.clone()));
        self.schema_name = Some(name.to_string());
        Ok(schema)
    }

    pub fn current_schema(&self) -> Option<Arc<MotifSchema>> {
        self.schema_name.as_deref().and_then(|name| self.lookup_schema(name))
    }

    pub fn current_root_path(&self) -> Result<SchemaPath> {
        self.current_schema()
            .map(|s| s.root_path())
            .ok_or_else(|| MotifError::internal("no schema has been set for the current statement"))
    }

    /// Resolve dotted `components` through the source their head names.
    /// `Ok(None)` when the head names no source.
    pub fn path(&self, components: &[String], key: Option<&str>) -> std::result::Result<Option<PathResolution>, String> {
        let Some(head) = components.first() else {
            return Ok(None);
        };
        match self.get_definition(Context::Source, head) {
            Some(Definition::Schema(schema)) => schema.form_path(components, key).map(|r| Some(PathResolution::Schema(r))),
            Some(Definition::Funnel(funnel)) => {
                form_funnel_path(&funnel.name, components).map(|p| Some(PathResolution::Funnel(p)))
            }
            Some(Definition::Segment(segment)) => {
                form_segment_path(&segment.name, components).map(|p| Some(PathResolution::Segment(p)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::parser::parse_schema;

    fn symbols() -> PathSymbols {
        let catalog = SchemaCatalog::new();
        let schema = parse_schema(
            "schema Test { version : 1 root) user : User structure User { 0) id : long key 1) sessions : vector(Session) } structure Session { 0) startTime : long ordinal } }",
        )
        .unwrap();
        catalog.register(schema);
        PathSymbols::new(Arc::new(catalog), "UTC")
    }

    fn comps(s: &str) -> Vec<String> {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn permanent_scopes_cannot_be_popped() {
        let mut symbols = symbols();
        assert!(symbols.pop_scope().unwrap_err().is_internal());
        symbols.push_scope();
        assert!(symbols.pop_scope().is_ok());
    }

    #[test]
    fn popped_scopes_can_be_restored() {
        let mut symbols = symbols();
        symbols.push_scope();
        symbols
            .add_current(Context::Target, Definition::Target(TargetDefinition { name: "t".into(), dtype: DataType::Long }))
            .unwrap();
        let handle = symbols.pop_scope().unwrap();
        assert!(symbols.target("t").is_none());
        symbols.restore_scope(handle).unwrap();
        assert_eq!(symbols.target("t").map(|t| t.dtype), Some(DataType::Long));
    }

    #[test]
    fn duplicates_in_one_scope_fail() {
        let mut symbols = symbols();
        symbols.push_scope();
        let param = ParameterDefinition {
            name: "p".into(),
            dtype: DataType::Long,
            vector: false,
            location: Default::default(),
        };
        symbols.add_current(Context::Parameter, Definition::Parameter(param.clone())).unwrap();
        assert_eq!(
            symbols.add_current(Context::Parameter, Definition::Parameter(param)),
            Err("PARAMETER named 'p' has already been defined".to_string())
        );
    }

    #[test]
    fn failed_redefinition_keeps_the_first() {
        let mut symbols = symbols();
        symbols.push_scope();
        let first = ParameterDefinition {
            name: "p".into(),
            dtype: DataType::Long,
            vector: false,
            location: Default::default(),
        };
        let second = ParameterDefinition {
            dtype: DataType::String,
            vector: true,
            ..first.clone()
        };
        symbols.add_current(Context::Parameter, Definition::Parameter(first)).unwrap();
        assert!(symbols.add_current(Context::Parameter, Definition::Parameter(second)).is_err());
        assert!(matches!(
            symbols.get_definition(Context::Parameter, "p"),
            Some(Definition::Parameter(p)) if p.dtype == DataType::Long && !p.vector
        ));
    }

    #[test]
    fn parent_definitions_outlive_the_statement() {
        let mut symbols = symbols();
        symbols.push_scope();
        let sig = SourceSignature { name: "f".into(), schema: "Test".into(), parameters: vec![] };
        symbols.add_parent(Context::Source, Definition::Funnel(Arc::new(sig))).unwrap();
        symbols.pop_scope().unwrap();
        assert!(symbols.funnel("f").is_some());
    }

    #[test]
    fn paths_resolve_through_the_root_alias() {
        let mut symbols = symbols();
        symbols.push_scope();
        assert!(symbols.path(&comps("user.id"), None).unwrap().is_none());
        symbols.set_current_root_path("test").unwrap();
        let resolved = symbols.path(&comps("user.sessions.startTime"), None).unwrap();
        assert!(matches!(resolved, Some(PathResolution::Schema(_))));
        assert_eq!(symbols.current_root_path().unwrap().components, comps("user"));
        assert!(symbols.function("SIZE").is_some());
    }
}
