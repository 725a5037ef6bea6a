//! Evaluation points ("axes") in the object tree.
//!
//! Every bound expression has a lowest evaluation point. Two points are on
//! the same axis when one is an ancestor of the other; combining expressions
//! whose points are off-axis is rejected during validation. The comparison
//! protocol is shared by every path family:
//!
//! ```text
//! user                          root
//! user.sessions                 collection axis below the root
//! user.sessions.startTime       scalar, evaluated at user.sessions
//! user.application.firstUse     scalar reference, evaluated at user
//! f.paths.steps                 funnel axis: f -> f.paths -> f.paths.steps
//! ```

use crate::schema::RelationType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONSTANT_PATH: &str = "_constant_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Path {
    /// Point of a constant; on path with everything, higher than nothing.
    Constant,
    Schema(SchemaPath),
    Funnel(FunnelPath),
    Segment(SegmentPath),
    Target(TargetPath),
}

/// How a map or vector relation is addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MapAccess {
    #[default]
    Whole,
    /// `m['k']`
    Lookup,
    /// `m.key`
    Key,
    /// `m.value` or `v.value`
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPath {
    pub schema: String,
    pub components: Vec<String>,
    /// Lengths of the axis-bearing prefixes of `components`, ascending.
    pub axes: Vec<usize>,
    /// `None` for structure paths.
    pub relation: Option<RelationType>,
    #[serde(default)]
    pub access: MapAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunnelLevel {
    Funnel,
    Paths,
    Steps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelPath {
    pub funnel: String,
    pub level: FunnelLevel,
    pub field: Option<String>,
}

/// `s.members` or `s.members.id`. Segment membership is computed ahead of
/// the scan so every segment path is a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPath {
    pub segment: String,
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPath {
    pub name: String,
}

pub const FUNNEL_PATHS_FIELDS: &[&str] = &["startTime", "endTime", "ordinal", "isComplete", "isFirst", "isLast"];
pub const FUNNEL_STEPS_FIELDS: &[&str] = &["id", "time", "ordinal", "isFirst", "isLast", "isComplete"];
pub const SEGMENT_MEMBERS_FIELDS: &[&str] = &["id"];

impl SchemaPath {
    pub fn root(schema: &str, root_field: &str) -> SchemaPath {
        SchemaPath {
            schema: schema.to_string(),
            components: vec![root_field.to_string()],
            axes: vec![1],
            relation: None,
            access: MapAccess::Whole,
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.len() == 1
    }

    fn prefix(&self, len: usize) -> SchemaPath {
        if len >= self.components.len() {
            return self.clone();
        }
        SchemaPath {
            schema: self.schema.clone(),
            components: self.components[..len].to_vec(),
            axes: self.axes.iter().copied().filter(|a| *a <= len).collect(),
            relation: None,
            access: MapAccess::Whole,
        }
    }

    pub fn enclosing(&self) -> SchemaPath {
        let len = self.components.len();
        let axis = self
            .axes
            .iter()
            .copied()
            .filter(|a| *a <= len)
            .max()
            .unwrap_or(1);
        self.prefix(axis)
    }

    pub fn parent(&self) -> SchemaPath {
        if self.is_root() {
            return self.clone();
        }
        let len = self.components.len();
        match self.relation {
            // a scalar field belongs to its structure, whose parent is one up
            Some(rt) if !self.axes.contains(&len) && rt != RelationType::Instance => {
                self.prefix(len - 1).parent()
            }
            _ => self.prefix(len - 1),
        }
    }

    fn is_prefix_of(&self, other: &SchemaPath) -> bool {
        self.components.len() <= other.components.len()
            && self.components.iter().zip(&other.components).all(|(a, b)| a == b)
    }

    fn same_on_path(&self, p: &Path) -> bool {
        match p {
            Path::Schema(other) => {
                let (one, two) = (self.enclosing(), other.enclosing());
                one.is_prefix_of(&two) || two.is_prefix_of(&one)
            }
            other => other.is_root(),
        }
    }

    fn same_higher(&self, p: &Path) -> bool {
        match p {
            Path::Schema(other) => {
                let (one, two) = (self.enclosing(), other.enclosing());
                one.components.len() < two.components.len() && one.is_prefix_of(&two)
            }
            _ => false,
        }
    }

    fn same_lower(&self, p: &Path) -> bool {
        match p {
            Path::Schema(other) => other.enclosing().is_prefix_of(&self.enclosing()),
            _ => false,
        }
    }

    /// True when this path names a collection axis (reference vector, value
    /// vector or map).
    pub fn is_collection(&self) -> bool {
        !self.is_root() && self.axes.contains(&self.components.len())
    }
}

impl FunnelPath {
    pub fn new(funnel: &str, level: FunnelLevel, field: Option<&str>) -> FunnelPath {
        FunnelPath {
            funnel: funnel.to_string(),
            level,
            field: field.map(str::to_string),
        }
    }

    fn same_funnel<'a>(&self, p: &'a Path) -> Option<&'a FunnelPath> {
        match p {
            Path::Funnel(other) if other.funnel == self.funnel => Some(other),
            _ => None,
        }
    }
}

impl Path {
    pub fn is_root(&self) -> bool {
        match self {
            Path::Constant => true,
            Path::Schema(sp) => sp.is_root(),
            Path::Funnel(fp) => fp.level == FunnelLevel::Funnel && fp.field.is_none(),
            Path::Segment(_) => true,
            Path::Target(_) => false,
        }
    }

    /// The nearest axis-bearing ancestor, possibly the path itself.
    pub fn enclosing(&self) -> Path {
        match self {
            Path::Schema(sp) => Path::Schema(sp.enclosing()),
            Path::Funnel(fp) => Path::Funnel(FunnelPath::new(&fp.funnel, fp.level, None)),
            Path::Segment(sp) => Path::Segment(SegmentPath {
                segment: sp.segment.clone(),
                field: None,
            }),
            other => other.clone(),
        }
    }

    /// The axis one level up, or the path itself at a root.
    pub fn parent(&self) -> Path {
        match self {
            Path::Schema(sp) => Path::Schema(sp.parent()),
            Path::Funnel(fp) => {
                let level = match fp.level {
                    FunnelLevel::Funnel | FunnelLevel::Paths => FunnelLevel::Funnel,
                    FunnelLevel::Steps => FunnelLevel::Paths,
                };
                Path::Funnel(FunnelPath::new(&fp.funnel, level, None))
            }
            other => other.enclosing(),
        }
    }

    fn same_on_path(&self, p: &Path) -> bool {
        match self {
            Path::Constant => matches!(p, Path::Constant),
            Path::Schema(sp) => sp.same_on_path(p),
            Path::Funnel(fp) => p.is_root() || fp.same_funnel(p).is_some(),
            Path::Segment(sp) => {
                p.is_root() || matches!(p, Path::Segment(other) if other.segment == sp.segment)
            }
            Path::Target(tp) => {
                p.is_root() || matches!(p, Path::Target(other) if other.name == tp.name)
            }
        }
    }

    fn same_higher(&self, p: &Path) -> bool {
        match self {
            Path::Constant => !p.is_root(),
            Path::Schema(sp) => sp.same_higher(p),
            Path::Funnel(fp) => fp.same_funnel(p).is_some_and(|other| fp.level < other.level),
            Path::Segment(sp) => {
                sp.field.is_none() && matches!(p, Path::Segment(other) if other.segment == sp.segment && other.field.is_some())
            }
            Path::Target(_) => false,
        }
    }

    fn same_lower(&self, p: &Path) -> bool {
        match self {
            Path::Constant => false,
            Path::Schema(sp) => sp.same_lower(p),
            Path::Funnel(fp) => fp.same_funnel(p).is_some_and(|other| fp.level >= other.level),
            Path::Segment(sp) => matches!(p, Path::Segment(other) if other.segment == sp.segment),
            Path::Target(_) => self.same_on_path(p),
        }
    }

    pub fn not_on_path(&self, p: &Path) -> bool {
        !self.is_root() && !p.is_root() && !self.same_on_path(p)
    }

    /// Strictly higher (an ancestor) than `p`.
    pub fn higher(&self, p: &Path) -> bool {
        if matches!(p, Path::Constant) {
            return false;
        }
        match (self.is_root(), p.is_root()) {
            (true, true) => false,
            (true, false) => true,
            (false, true) => false,
            (false, false) => self.same_higher(p),
        }
    }

    /// Lower than or equal to `p`.
    pub fn lower(&self, p: &Path) -> bool {
        p.is_root() || self.same_lower(p)
    }

    pub fn as_schema(&self) -> Option<&SchemaPath> {
        match self {
            Path::Schema(sp) => Some(sp),
            _ => None,
        }
    }
}

/// The lowest common evaluation point of `paths`, or `None` when two of them
/// are off-axis.
pub fn lowest<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<Path> {
    let mut low: Option<Path> = None;
    for p in paths {
        low = match low {
            None => Some(p.enclosing()),
            Some(l) if l.higher(p) => Some(p.enclosing()),
            Some(l) if l.lower(p) => Some(l),
            Some(_) => return None,
        };
    }
    low
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Constant => f.write_str(CONSTANT_PATH),
            Path::Schema(sp) => f.write_str(&sp.components.join(".")),
            Path::Funnel(fp) => {
                f.write_str(&fp.funnel)?;
                match fp.level {
                    FunnelLevel::Funnel => {}
                    FunnelLevel::Paths => f.write_str(".paths")?,
                    FunnelLevel::Steps => f.write_str(".paths.steps")?,
                }
                if let Some(field) = &fp.field {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Path::Segment(sp) => {
                write!(f, "{}.members", sp.segment)?;
                if let Some(field) = &sp.field {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Path::Target(tp) => f.write_str(&tp.name),
        }
    }
}

/// Form a funnel path from dotted components whose head names the funnel.
pub fn form_funnel_path(funnel: &str, components: &[String]) -> Result<FunnelPath, String> {
    let full = components.join(".");
    if components.is_empty() {
        return Err(format!("funnel path '{full}' is malformed for funnel '{funnel}'"));
    }
    if components.len() == 1 {
        return Ok(FunnelPath::new(funnel, FunnelLevel::Funnel, None));
    }
    if components[1] != "paths" {
        return Err(format!("funnel path '{full}' must refer to a `paths` component"));
    }
    if components.len() > 3 && components[2] != "steps" {
        return Err(format!("funnel path '{full}' must refer to a `steps` component"));
    }
    if components.len() > 4 {
        return Err(format!("invalid funnel path '{full}'"));
    }
    match components.len() {
        2 => Ok(FunnelPath::new(funnel, FunnelLevel::Paths, None)),
        3 if components[2] == "steps" => Ok(FunnelPath::new(funnel, FunnelLevel::Steps, None)),
        3 => find_field(FUNNEL_PATHS_FIELDS, &components[2])
            .map(|f| FunnelPath::new(funnel, FunnelLevel::Paths, Some(f)))
            .ok_or_else(|| format!("Invalid field '{}' in {funnel}.paths", components[2])),
        _ => find_field(FUNNEL_STEPS_FIELDS, &components[3])
            .map(|f| FunnelPath::new(funnel, FunnelLevel::Steps, Some(f)))
            .ok_or_else(|| format!("Invalid field '{}' in {funnel}.paths.steps", components[3])),
    }
}

/// Form a segment path from dotted components whose head names the segment.
pub fn form_segment_path(segment: &str, components: &[String]) -> Result<SegmentPath, String> {
    let full = components.join(".");
    if components.len() < 2 || components.len() > 3 {
        return Err(format!("segment path '{full}' is malformed for segment '{segment}'"));
    }
    if components[1] != "members" {
        return Err(format!(
            "segment path '{full}' must refer to `members` component for segment '{segment}'"
        ));
    }
    let field = match components.get(2) {
        None => None,
        Some(name) => Some(
            find_field(SEGMENT_MEMBERS_FIELDS, name)
                .ok_or_else(|| format!("Invalid field '{name}' in {segment}"))?
                .to_string(),
        ),
    };
    Ok(SegmentPath {
        segment: segment.to_string(),
        field,
    })
}

fn find_field(fields: &[&'static str], name: &str) -> Option<&'static str> {
    fields.iter().copied().find(|f| f.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_path(comps: &[&str], axes: &[usize], relation: Option<RelationType>) -> Path {
        Path::Schema(SchemaPath {
            schema: "quo".to_string(),
            components: comps.iter().map(|c| c.to_string()).collect(),
            axes: axes.to_vec(),
            relation,
            access: MapAccess::Whole,
        })
    }

    #[test]
    fn scalars_enclose_to_their_collection() {
        let start = schema_path(&["user", "sessions", "startTime"], &[1, 2], Some(RelationType::ValueScalar));
        let sessions = schema_path(&["user", "sessions"], &[1, 2], None);
        assert_eq!(start.enclosing(), sessions);
        assert_eq!(start.parent().to_string(), "user");
        assert_eq!(lowest([&start, &start]), Some(start.enclosing()));
    }

    #[test]
    fn scalar_references_walk_to_the_root() {
        let country = schema_path(
            &["user", "application", "firstUse", "countryId"],
            &[1],
            Some(RelationType::ValueScalar),
        );
        assert_eq!(country.enclosing().to_string(), "user");
    }

    #[test]
    fn branches_are_off_axis() {
        let events = schema_path(&["user", "sessions", "events", "id"], &[1, 2, 3], Some(RelationType::ValueScalar));
        let segments = schema_path(&["user", "segments", "segmentId"], &[1, 2], Some(RelationType::ValueScalar));
        let flurry = schema_path(&["user", "flurryId"], &[1], Some(RelationType::ValueScalar));
        assert_eq!(lowest([&events, &segments]), None);
        assert!(events.not_on_path(&segments));
        assert_eq!(lowest([&flurry, &events]).map(|p| p.to_string()), Some("user.sessions.events".to_string()));
        assert_eq!(lowest([&events, &flurry]).map(|p| p.to_string()), Some("user.sessions.events".to_string()));
    }

    #[test]
    fn constants_never_lead() {
        let sessions = schema_path(&["user", "sessions"], &[1, 2], None);
        assert!(!sessions.higher(&Path::Constant));
        assert!(Path::Constant.higher(&sessions));
        assert_eq!(lowest([&Path::Constant, &sessions]), Some(sessions.clone()));
        assert_eq!(lowest([&sessions, &Path::Constant]), Some(sessions));
    }

    #[test]
    fn funnel_levels_are_ordered() {
        let comps = |s: &str| s.split('.').map(str::to_string).collect::<Vec<_>>();
        let f = Path::Funnel(form_funnel_path("f", &comps("f")).unwrap());
        let paths = Path::Funnel(form_funnel_path("f", &comps("f.paths")).unwrap());
        let steps = Path::Funnel(form_funnel_path("f", &comps("f.paths.steps")).unwrap());
        let time = Path::Funnel(form_funnel_path("f", &comps("f.paths.steps.time")).unwrap());
        assert!(f.is_root());
        assert!(paths.higher(&steps));
        assert!(!steps.higher(&paths));
        assert!(steps.lower(&paths));
        assert_eq!(lowest([&steps, &paths]), Some(steps.clone()));
        assert_eq!(time.enclosing(), steps);
        assert_eq!(time.to_string(), "f.paths.steps.time");
    }

    #[test]
    fn malformed_funnel_paths_are_rejected() {
        let comps = |s: &str| s.split('.').map(str::to_string).collect::<Vec<_>>();
        assert_eq!(
            form_funnel_path("f", &comps("f.steps")),
            Err("funnel path 'f.steps' must refer to a `paths` component".to_string())
        );
        assert_eq!(
            form_funnel_path("f", &comps("f.paths.bogus")),
            Err("Invalid field 'bogus' in f.paths".to_string())
        );
        assert!(form_segment_path("s", &comps("s")).is_err());
        assert!(form_segment_path("s", &comps("s.members.id")).is_ok());
    }

    #[test]
    fn targets_sit_beside_the_schema() {
        let t = Path::Target(TargetPath { name: "a".into() });
        let root = schema_path(&["user"], &[1], None);
        let sessions = schema_path(&["user", "sessions"], &[1, 2], None);
        assert_eq!(lowest([&t, &t]), Some(t.clone()));
        assert_eq!(lowest([&root, &t]), Some(t.clone()));
        assert_eq!(lowest([&t, &sessions]), None);
    }
}
