//! Schema model: structures, relations and the precomputed path maps used to
//! resolve dotted paths.
//!
//! A schema is declared in text and built once:
//!
//! ```text
//! schema Quo {
//!   version : 1
//!   root) user : User
//!   structure User {
//!     0) flurryId : long key
//!     1) sessions : vector(Session)
//!   }
//!   structure Session {
//!     0) startTime : long ordinal
//!     1) parameters : map(string, string)
//!   }
//! }
//! ```
//!
//! Building walks every reference from the root field and records, for each
//! reachable structure, its dotted path and the axis-bearing prefixes along
//! the way. Path resolution is then a pair of map lookups.

use crate::datatype::DataType;
use crate::error::{Location, MotifError, Result};
use crate::path::{MapAccess, SchemaPath};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    ValueScalar,
    ValueVector,
    ValueMap,
    ReferenceScalar,
    ReferenceVector,
    Instance,
    Target,
}

impl RelationType {
    pub fn name(self) -> &'static str {
        match self {
            RelationType::ValueScalar => "VALUE_SCALAR",
            RelationType::ValueVector => "VALUE_VECTOR",
            RelationType::ValueMap => "VALUE_MAP",
            RelationType::ReferenceScalar => "REFERENCE_SCALAR",
            RelationType::ReferenceVector => "REFERENCE_VECTOR",
            RelationType::Instance => "INSTANCE",
            RelationType::Target => "TARGET",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classifier {
    Key,
    Ordinal,
}

impl Classifier {
    pub fn from_keyword(word: &str) -> Option<Classifier> {
        match word.to_ascii_lowercase().as_str() {
            "key" => Some(Classifier::Key),
            "ordinal" => Some(Classifier::Ordinal),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Classifier::Key => "key",
            Classifier::Ordinal => "ordinal",
        }
    }
}

// ----------------------------------------------------------------------------
// Declarations, as written in schema text
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Value(DataType),
    ValueVector(DataType),
    ValueMap(DataType, DataType),
    Reference(String),
    ReferenceVector(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub number: u32,
    pub name: String,
    pub ftype: FieldType,
    pub classifiers: Vec<Classifier>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureDecl {
    pub name: String,
    pub extends: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDecl {
    pub name: String,
    pub version: u32,
    pub root_field: String,
    pub root_type: String,
    pub structures: Vec<StructureDecl>,
    pub location: Location,
}

// ----------------------------------------------------------------------------
// Built model
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub number: u32,
    pub name: String,
    pub rtype: RelationType,
    /// Value type, or `STRUCTURE` for references.
    pub dtype: DataType,
    pub key_dtype: Option<DataType>,
    /// Referenced structure name for reference relations.
    pub reference: Option<String>,
    pub classifiers: Vec<Classifier>,
}

impl Relation {
    pub fn has_classifier(&self, classifier: Classifier) -> bool {
        self.classifiers.contains(&classifier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub name: String,
    pub parent: Option<String>,
    /// Inherited relations first, each group ordered by field number.
    pub relations: Vec<Relation>,
}

impl Structure {
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// The field ordering instances of this structure in time: the
    /// `ordinal` classified field, else the `key` field.
    pub fn ordering_field(&self) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.has_classifier(Classifier::Ordinal))
            .or_else(|| self.relations.iter().find(|r| r.has_classifier(Classifier::Key)))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StructureEntry {
    structure: String,
    axes: Vec<usize>,
}

/// Outcome of resolving dotted components against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaResolution {
    pub path: SchemaPath,
    /// The relation for relation paths; `None` for structure (instance) paths.
    pub relation: Option<Relation>,
    /// Name of the structure the path is, or the relation lives in.
    pub structure: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotifSchema {
    pub name: String,
    pub version: u32,
    pub root_field: String,
    pub root_structure: String,
    structures: Vec<Structure>,
    structure_paths: HashMap<String, StructureEntry>,
}

impl MotifSchema {
    pub fn build(decl: &SchemaDecl) -> Result<MotifSchema> {
        let mut by_name: HashMap<&str, &StructureDecl> = HashMap::new();
        for s in &decl.structures {
            if by_name.insert(s.name.as_str(), s).is_some() {
                return Err(MotifError::parse(
                    s.location,
                    format!("structure '{}' is already defined", s.name),
                ));
            }
        }

        let mut structures = Vec::with_capacity(decl.structures.len());
        for s in &decl.structures {
            structures.push(flatten_structure(s, &by_name)?);
        }

        if !by_name.contains_key(decl.root_type.as_str()) {
            return Err(MotifError::parse(
                decl.location,
                format!("root structure '{}' is not defined", decl.root_type),
            ));
        }

        let mut schema = MotifSchema {
            name: decl.name.clone(),
            version: decl.version,
            root_field: decl.root_field.clone(),
            root_structure: decl.root_type.clone(),
            structures,
            structure_paths: HashMap::new(),
        };

        let mut chain = vec![decl.root_type.clone()];
        let mut visited = HashMap::new();
        schema.explore(
            &decl.root_field,
            &decl.root_type,
            vec![1],
            &mut chain,
            &mut visited,
            decl.location,
        )?;
        schema.structure_paths = visited;

        debug!(
            schema = %schema.name,
            structures = schema.structures.len(),
            paths = schema.structure_paths.len(),
            "built schema"
        );
        Ok(schema)
    }

    fn explore(
        &self,
        path: &str,
        structure: &str,
        axes: Vec<usize>,
        chain: &mut Vec<String>,
        visited: &mut HashMap<String, StructureEntry>,
        location: Location,
    ) -> Result<()> {
        visited.insert(
            path.to_string(),
            StructureEntry {
                structure: structure.to_string(),
                axes: axes.clone(),
            },
        );
        let Some(s) = self.structure(structure) else {
            return Err(MotifError::parse(location, format!("unknown structure '{structure}'")));
        };
        for relation in &s.relations {
            let Some(target) = &relation.reference else {
                continue;
            };
            let child_path = format!("{path}.{}", relation.name);
            if chain.iter().any(|c| c == target) {
                return Err(MotifError::parse(
                    location,
                    format!("reference cycle through structure '{target}' at '{child_path}'"),
                ));
            }
            let mut child_axes = axes.clone();
            if relation.rtype == RelationType::ReferenceVector {
                child_axes.push(child_path.split('.').count());
            }
            chain.push(target.clone());
            self.explore(&child_path, target, child_axes, chain, visited, location)?;
            chain.pop();
        }
        Ok(())
    }

    pub fn structure(&self, name: &str) -> Option<&Structure> {
        self.structures.iter().find(|s| s.name == name)
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn root_path(&self) -> SchemaPath {
        SchemaPath::root(&self.name, &self.root_field)
    }

    /// The structure an instance path names.
    pub fn structure_at(&self, path: &SchemaPath) -> Option<&Structure> {
        self.structure_paths
            .get(&path.components.join("."))
            .and_then(|e| self.structure(&e.structure))
    }

    /// Every reachable structure path, sorted.
    pub fn structure_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.structure_paths.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Resolve dotted components. The head is replaced by the root field so
    /// any alias of the schema resolves the same way. `key` is the map key
    /// text when the path is followed by `[key]`.
    pub fn form_path(
        &self,
        components: &[String],
        key: Option<&str>,
    ) -> std::result::Result<SchemaResolution, String> {
        if components.is_empty() {
            return Err(format!("empty path in schema '{}'", self.name));
        }
        let mut comps = components.to_vec();
        comps[0] = self.root_field.clone();

        let mut access = MapAccess::Whole;
        if comps.len() > 2 {
            let last = comps[comps.len() - 1].to_ascii_lowercase();
            let owner = comps[..comps.len() - 1].join(".");
            let collection = self.relation_at(&owner).is_some_and(|r| {
                matches!(r.rtype, RelationType::ValueMap | RelationType::ValueVector)
            });
            if collection && (last == "key" || last == "value") {
                access = if last == "key" { MapAccess::Key } else { MapAccess::Value };
                comps.pop();
            }
        }

        let full = comps.join(".");
        if let Some(entry) = self.structure_paths.get(&full) {
            if let Some(k) = key {
                return Err(format!(
                    "instance reference structure '{}' in schema '{}' has map key '{k}'",
                    entry.structure, self.name
                ));
            }
            return Ok(SchemaResolution {
                path: SchemaPath {
                    schema: self.name.clone(),
                    components: comps,
                    axes: entry.axes.clone(),
                    relation: None,
                    access,
                },
                relation: None,
                structure: entry.structure.clone(),
            });
        }

        let parent = comps[..comps.len() - 1].join(".");
        let field = comps[comps.len() - 1].clone();
        let Some(entry) = self.structure_paths.get(&parent) else {
            return Err(format!("could not bind '{full}' in schema '{}'", self.name));
        };
        let relation = self
            .structure(&entry.structure)
            .and_then(|s| s.relation(&field))
            .ok_or_else(|| {
                format!(
                    "could not find relation '{field}' in structure '{parent}' in schema '{}'",
                    self.name
                )
            })?;

        let mut axes = entry.axes.clone();
        match relation.rtype {
            RelationType::ValueVector => {
                if let Some(k) = key {
                    return Err(format!(
                        "value vector relation '{field}' in structure '{}' in schema '{}' cannot have a map key '{k}'",
                        entry.structure, self.name
                    ));
                }
                if access == MapAccess::Key {
                    return Err(not_a_collection(&field, &entry.structure, &self.name));
                }
                axes.push(comps.len());
            }
            RelationType::ValueMap => {
                if key.is_some() {
                    access = MapAccess::Lookup;
                } else {
                    axes.push(comps.len());
                }
            }
            _ => {
                if let Some(k) = key {
                    return Err(format!(
                        "non map relation '{field}' in structure '{}' in schema '{}' has map key '{k}'",
                        entry.structure, self.name
                    ));
                }
                if access != MapAccess::Whole {
                    return Err(not_a_collection(&field, &entry.structure, &self.name));
                }
            }
        }

        Ok(SchemaResolution {
            path: SchemaPath {
                schema: self.name.clone(),
                components: comps,
                axes,
                relation: Some(relation.rtype),
                access,
            },
            relation: Some(relation.clone()),
            structure: entry.structure.clone(),
        })
    }

    fn relation_at(&self, path: &str) -> Option<&Relation> {
        let (parent, field) = path.rsplit_once('.')?;
        let entry = self.structure_paths.get(parent)?;
        self.structure(&entry.structure)?.relation(field)
    }
}

fn not_a_collection(field: &str, structure: &str, schema: &str) -> String {
    format!("Relation '{field}' in structure '{structure}' in schema '{schema}' cannot be used as a vector or map")
}

fn flatten_structure(decl: &StructureDecl, by_name: &HashMap<&str, &StructureDecl>) -> Result<Structure> {
    // collect the extends chain, nearest last
    let mut lineage = vec![decl];
    let mut seen = HashSet::from([decl.name.as_str()]);
    let mut current = decl;
    while let Some(parent) = &current.extends {
        let Some(p) = by_name.get(parent.as_str()) else {
            return Err(MotifError::parse(
                current.location,
                format!("unknown parent structure '{parent}' for structure '{}'", current.name),
            ));
        };
        if !seen.insert(p.name.as_str()) {
            return Err(MotifError::parse(
                current.location,
                format!("structure '{}' extends itself", decl.name),
            ));
        }
        lineage.push(p);
        current = p;
    }
    lineage.reverse();

    let mut relations: Vec<Relation> = Vec::new();
    for s in lineage {
        let mut fields: Vec<&FieldDecl> = s.fields.iter().collect();
        fields.sort_by_key(|f| f.number);
        for field in fields {
            if relations.iter().any(|r| r.number == field.number) {
                return Err(MotifError::parse(
                    field.location,
                    format!("'{}.{}' has redundant field number {}", decl.name, field.name, field.number),
                ));
            }
            if relations.iter().any(|r| r.name == field.name) {
                return Err(MotifError::parse(
                    field.location,
                    format!("'{}.{}' has redundant field name", decl.name, field.name),
                ));
            }
            relations.push(build_relation(field, by_name, &decl.name)?);
        }
    }

    Ok(Structure {
        name: decl.name.clone(),
        parent: decl.extends.clone(),
        relations,
    })
}

fn build_relation(field: &FieldDecl, by_name: &HashMap<&str, &StructureDecl>, owner: &str) -> Result<Relation> {
    let check = |name: &String| -> Result<()> {
        if by_name.contains_key(name.as_str()) {
            Ok(())
        } else {
            Err(MotifError::parse(
                field.location,
                format!("unknown type '{name}' for field '{owner}.{}'", field.name),
            ))
        }
    };

    let (rtype, dtype, key_dtype, reference) = match &field.ftype {
        FieldType::Value(dt) => (RelationType::ValueScalar, *dt, None, None),
        FieldType::ValueVector(dt) => (RelationType::ValueVector, *dt, None, None),
        FieldType::ValueMap(k, v) => (RelationType::ValueMap, *v, Some(*k), None),
        FieldType::Reference(name) => {
            check(name)?;
            (RelationType::ReferenceScalar, DataType::Structure, None, Some(name.clone()))
        }
        FieldType::ReferenceVector(name) => {
            check(name)?;
            (RelationType::ReferenceVector, DataType::Structure, None, Some(name.clone()))
        }
    };

    Ok(Relation {
        number: field.number,
        name: field.name.clone(),
        rtype,
        dtype,
        key_dtype,
        reference,
        classifiers: field.classifiers.clone(),
    })
}
