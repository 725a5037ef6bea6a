//! Schema catalog: where schema names resolve to built schemas.
//!
//! The parsing pipeline only needs the [`SchemaLookup`] contract. The
//! [`SchemaCatalog`] implementation keeps schemas in a read-mostly map and
//! loads the intrinsic `*.motif` files of its schema directory once, on first
//! use, no matter how many threads ask at the same time.

use crate::error::Result;
use crate::parser::parse_schema;
use crate::schema::MotifSchema;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, OnceLock, RwLock};
use tracing::{debug, info, warn};

/// Resolves schema names for the symbol table.
pub trait SchemaLookup: Send + Sync {
    fn lookup_schema(&self, name: &str) -> Option<Arc<MotifSchema>>;

    /// Every name a schema can be looked up by.
    fn all_schema_aliases(&self) -> BTreeSet<String>;
}

#[derive(Debug)]
pub struct SchemaCatalog {
    schemas: RwLock<HashMap<String, Arc<MotifSchema>>>,
    schema_dir: Option<PathBuf>,
    discovery: Once,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        SchemaCatalog {
            schemas: RwLock::new(HashMap::new()),
            schema_dir: None,
            discovery: Once::new(),
        }
    }
}

static GLOBAL: OnceLock<Arc<SchemaCatalog>> = OnceLock::new();

impl SchemaCatalog {
    /// An empty catalog without intrinsic schemas.
    pub fn new() -> Self {
        SchemaCatalog::default()
    }

    /// A catalog that loads every `*.motif` file in `dir` on first use.
    pub fn with_schema_dir(dir: impl Into<PathBuf>) -> Self {
        SchemaCatalog {
            schema_dir: Some(dir.into()),
            ..SchemaCatalog::default()
        }
    }

    /// The process-wide catalog, with its schema directory taken from
    /// `MOTIF_SCHEMA_DIR`.
    pub fn global() -> Arc<SchemaCatalog> {
        GLOBAL
            .get_or_init(|| {
                let config = crate::config::MotifConfig::from_env();
                Arc::new(match config.schema_dir {
                    Some(dir) => SchemaCatalog::with_schema_dir(dir),
                    None => SchemaCatalog::new(),
                })
            })
            .clone()
    }

    /// Add `schema`, replacing any schema of the same name.
    pub fn register(&self, schema: MotifSchema) -> Arc<MotifSchema> {
        let schema = Arc::new(schema);
        self.register_alias(&schema.name, schema.clone());
        info!(schema = %schema.name, version = schema.version, "registered schema");
        schema
    }

    /// Make `schema` reachable under an additional name.
    pub fn register_alias(&self, alias: &str, schema: Arc<MotifSchema>) {
        let mut schemas = match self.schemas.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        schemas.insert(alias.to_lowercase(), schema);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<MotifSchema>> {
        self.discover();
        let schemas = match self.schemas.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        schemas.get(&name.to_lowercase()).cloned()
    }

    fn discover(&self) {
        let Some(dir) = &self.schema_dir else {
            return;
        };
        self.discovery.call_once(|| {
            debug!(dir = %dir.display(), "discovering intrinsic schemas");
            match self.load_dir(dir) {
                Ok(count) => info!(count, dir = %dir.display(), "loaded intrinsic schemas"),
                Err(err) => warn!(%err, dir = %dir.display(), "schema discovery failed"),
            }
        });
    }

    fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut count = 0;
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "motif"))
            .collect();
        files.sort();
        for file in files {
            match load_schema_file(&file) {
                Ok(schema) => {
                    self.register(schema);
                    count += 1;
                }
                Err(err) => warn!(%err, file = %file.display(), "skipping schema file"),
            }
        }
        Ok(count)
    }
}

/// Read and build one schema file.
pub fn load_schema_file(path: &Path) -> Result<MotifSchema> {
    let text = fs::read_to_string(path)?;
    parse_schema(&text)
}

impl SchemaLookup for SchemaCatalog {
    fn lookup_schema(&self, name: &str) -> Option<Arc<MotifSchema>> {
        self.get(name)
    }

    fn all_schema_aliases(&self) -> BTreeSet<String> {
        self.discover();
        let schemas = match self.schemas.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        schemas.keys().cloned().collect()
    }
}
