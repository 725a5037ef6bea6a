//! Run motif source through the pipeline

use super::CliError;
use crate::catalog::load_schema_file;
use crate::explain::Explain;
use crate::output::JsonNode;
use crate::{Expr, Motif, MotifConfig, SchemaCatalog, Statements, View};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What the source text holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum InputKind {
    /// A single expression, bound against a schema
    Expression,
    /// A view, bound against a schema
    View,
    /// Queries, funnels and segments
    #[default]
    Statements,
}

/// Options for the check, explain and json commands
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The motif source text
    pub source: String,
    pub kind: InputKind,
    /// Schema expressions and views bind against
    pub schema: Option<String>,
    /// Schema files registered before parsing
    pub schema_files: Vec<PathBuf>,
}

/// A finalized tree
#[derive(Debug)]
pub enum Checked {
    Expression(Expr),
    View(View),
    Statements(Statements),
}

impl Checked {
    pub fn generate_motif(&self) -> String {
        match self {
            Checked::Expression(e) => e.motif(),
            Checked::View(v) => v.generate_motif(),
            Checked::Statements(s) => s.generate_motif(),
        }
    }

    pub fn explain(&self) -> String {
        match self {
            Checked::Expression(e) => e.explain(),
            Checked::View(v) => v.explain(),
            Checked::Statements(s) => s.explain(),
        }
    }

    pub fn to_json(&self, pretty: bool) -> crate::Result<String> {
        match (self, pretty) {
            (Checked::Expression(e), true) => e.to_json_pretty(),
            (Checked::Expression(e), false) => e.to_json(),
            (Checked::View(v), true) => v.to_json_pretty(),
            (Checked::View(v), false) => v.to_json(),
            (Checked::Statements(s), true) => s.to_json_pretty(),
            (Checked::Statements(s), false) => s.to_json(),
        }
    }
}

/// A facade with every schema file registered, plus the name of the last
/// one loaded.
pub fn load_motif(schema_files: &[PathBuf]) -> Result<(Motif, Option<String>), CliError> {
    let config = MotifConfig::from_env();
    let catalog = match &config.schema_dir {
        Some(dir) => SchemaCatalog::with_schema_dir(dir),
        None => SchemaCatalog::new(),
    };
    let motif = Motif::with_catalog(config, Arc::new(catalog));

    let mut last = None;
    for path in schema_files {
        let schema = load_schema_file(path).map_err(|e| CliError::SchemaFile(path.clone(), e))?;
        debug!(file = %path.display(), schema = %schema.name, "loaded schema file");
        last = Some(motif.register_schema(schema).name.clone());
    }
    Ok((motif, last))
}

/// Parse and finalize the source text
pub fn execute_check(options: &CheckOptions) -> Result<Checked, CliError> {
    let (motif, loaded) = load_motif(&options.schema_files)?;
    let schema = || options.schema.clone().or(loaded.clone()).ok_or(CliError::NoSchema);

    Ok(match options.kind {
        InputKind::Expression => Checked::Expression(motif.parse_expression(&schema()?, &options.source)?),
        InputKind::View => Checked::View(motif.parse_view(&schema()?, &options.source)?),
        InputKind::Statements => Checked::Statements(motif.parse_motif_statements(&options.source)?),
    })
}

/// Explain a schema file without registering it
pub fn explain_schema_file(path: &Path) -> Result<String, CliError> {
    let schema = load_schema_file(path).map_err(|e| CliError::SchemaFile(path.to_path_buf(), e))?;
    Ok(schema.explain())
}
