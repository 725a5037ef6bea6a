pub mod ast;
pub mod catalog;
pub mod config;
pub mod datatype;
pub mod error;
pub mod evaluation;
pub mod explain;
pub mod generate;
pub mod lexer;
pub mod motif;
pub mod output;
pub mod parser;
pub mod path;
pub mod schema;
pub mod symbols;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{Expr, Query, Statement, Statements, Token, View};
pub use catalog::{SchemaCatalog, SchemaLookup};
pub use config::MotifConfig;
pub use datatype::DataType;
pub use error::{Location, MotifError, Result};
pub use evaluation::Evaluation;
pub use explain::Explain;
pub use lexer::Lexer;
pub use motif::Motif;
pub use output::{JsonNode, from_json, to_json, to_json_pretty};
pub use parser::Parser;
pub use path::Path;
pub use schema::MotifSchema;
