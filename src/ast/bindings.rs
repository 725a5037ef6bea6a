//! What a path accessor resolved to.

use crate::datatype::DataType;
use crate::path::{FunnelLevel, Path};
use crate::schema::RelationType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundPath {
    pub path: Path,
    pub dtype: DataType,
}

impl BoundPath {
    pub fn new(path: Path, dtype: DataType) -> Self {
        BoundPath { path, dtype }
    }
}

/// The resolved association between a path accessor and the relation,
/// structure, funnel, segment or target it names.
///
/// The funnel and segment variants share wire tags with the schema
/// variants; they are told apart on import by the shape of their path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BindingWire", into = "BindingWire")]
pub enum Binding {
    ValueScalar(BoundPath),
    ValueVector(BoundPath),
    /// `key_dtype` is the declared key type of the map, whatever part of
    /// the map the path addresses.
    ValueMap { bound: BoundPath, key_dtype: DataType },
    ReferenceScalar(BoundPath),
    ReferenceVector(BoundPath),
    Instance(BoundPath),
    Target(BoundPath),
    Funnel(BoundPath),
    FunnelPaths(BoundPath),
    FunnelSteps(BoundPath),
    Segment(BoundPath),
}

impl Binding {
    pub fn bound(&self) -> &BoundPath {
        match self {
            Binding::ValueScalar(b)
            | Binding::ValueVector(b)
            | Binding::ReferenceScalar(b)
            | Binding::ReferenceVector(b)
            | Binding::Instance(b)
            | Binding::Target(b)
            | Binding::Funnel(b)
            | Binding::FunnelPaths(b)
            | Binding::FunnelSteps(b)
            | Binding::Segment(b) => b,
            Binding::ValueMap { bound, .. } => bound,
        }
    }

    pub fn path(&self) -> &Path {
        &self.bound().path
    }

    pub fn dtype(&self) -> DataType {
        self.bound().dtype
    }

    pub fn relation_type(&self) -> RelationType {
        match self {
            Binding::ValueScalar(_) => RelationType::ValueScalar,
            Binding::ValueVector(_) => RelationType::ValueVector,
            Binding::ValueMap { .. } => RelationType::ValueMap,
            Binding::ReferenceScalar(_) | Binding::Funnel(_) => RelationType::ReferenceScalar,
            Binding::ReferenceVector(_) => RelationType::ReferenceVector,
            Binding::Instance(_)
            | Binding::FunnelPaths(_)
            | Binding::FunnelSteps(_)
            | Binding::Segment(_) => RelationType::Instance,
            Binding::Target(_) => RelationType::Target,
        }
    }

    /// True for bindings that name something instances can be counted in.
    pub fn is_collection(&self) -> bool {
        match self {
            Binding::ReferenceVector(_)
            | Binding::ValueVector(_)
            | Binding::FunnelPaths(_)
            | Binding::FunnelSteps(_)
            | Binding::Segment(_) => true,
            Binding::ValueMap { bound, .. } => bound.path.as_schema().is_some_and(|sp| sp.is_collection()),
            Binding::Instance(b) => !b.path.is_root(),
            _ => false,
        }
    }

    /// True for the instance-like bindings a rule target or a boundary can name.
    pub fn is_instance(&self) -> bool {
        matches!(
            self,
            Binding::Instance(_) | Binding::FunnelPaths(_) | Binding::FunnelSteps(_) | Binding::Segment(_)
        )
    }

    pub fn explain_name(&self) -> &'static str {
        match self {
            Binding::ValueScalar(_) => "ValueScalarBinding",
            Binding::ValueVector(_) => "ValueVectorBinding",
            Binding::ValueMap { .. } => "ValueMapBinding",
            Binding::ReferenceScalar(_) => "ReferenceScalarBinding",
            Binding::ReferenceVector(_) => "ReferenceVectorBinding",
            Binding::Instance(_) => "InstanceBinding",
            Binding::Target(_) => "TargetBinding",
            Binding::Funnel(_) => "FunnelBinding",
            Binding::FunnelPaths(_) => "FunnelPathsBinding",
            Binding::FunnelSteps(_) => "FunnelStepsBinding",
            Binding::Segment(_) => "SegmentBinding",
        }
    }
}

#[derive(Serialize, Deserialize)]
enum BindingWire {
    #[serde(rename = "VAL_SCAL_BD")]
    ValueScalar(BoundPath),
    #[serde(rename = "VAL_VEC_BD")]
    ValueVector(BoundPath),
    #[serde(rename = "VAL_MAP_BD")]
    ValueMap {
        path: Path,
        dtype: DataType,
        key_dtype: DataType,
    },
    #[serde(rename = "REF_SCAL_BD")]
    ReferenceScalar(BoundPath),
    #[serde(rename = "REF_VEC_BD")]
    ReferenceVector(BoundPath),
    #[serde(rename = "INST_BD")]
    Instance(BoundPath),
    #[serde(rename = "TARGET_BD")]
    Target(BoundPath),
}

impl From<Binding> for BindingWire {
    fn from(binding: Binding) -> Self {
        match binding {
            Binding::ValueScalar(b) => BindingWire::ValueScalar(b),
            Binding::ValueVector(b) => BindingWire::ValueVector(b),
            Binding::ValueMap { bound, key_dtype } => BindingWire::ValueMap {
                path: bound.path,
                dtype: bound.dtype,
                key_dtype,
            },
            Binding::ReferenceScalar(b) | Binding::Funnel(b) => BindingWire::ReferenceScalar(b),
            Binding::ReferenceVector(b) => BindingWire::ReferenceVector(b),
            Binding::Instance(b)
            | Binding::FunnelPaths(b)
            | Binding::FunnelSteps(b)
            | Binding::Segment(b) => BindingWire::Instance(b),
            Binding::Target(b) => BindingWire::Target(b),
        }
    }
}

impl From<BindingWire> for Binding {
    fn from(wire: BindingWire) -> Self {
        match wire {
            BindingWire::ValueScalar(b) => Binding::ValueScalar(b),
            BindingWire::ValueVector(b) => Binding::ValueVector(b),
            BindingWire::ValueMap { path, dtype, key_dtype } => Binding::ValueMap {
                bound: BoundPath::new(path, dtype),
                key_dtype,
            },
            BindingWire::ReferenceScalar(b) => match b.path {
                Path::Funnel(_) => Binding::Funnel(b),
                _ => Binding::ReferenceScalar(b),
            },
            BindingWire::ReferenceVector(b) => Binding::ReferenceVector(b),
            BindingWire::Instance(b) => match &b.path {
                Path::Funnel(fp) if fp.level == FunnelLevel::Steps => Binding::FunnelSteps(b),
                Path::Funnel(_) => Binding::FunnelPaths(b),
                Path::Segment(_) => Binding::Segment(b),
                _ => Binding::Instance(b),
            },
            BindingWire::Target(b) => Binding::Target(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{FunnelPath, SegmentPath};

    #[test]
    fn funnel_bindings_survive_the_wire() {
        let paths = Binding::FunnelPaths(BoundPath::new(
            Path::Funnel(FunnelPath::new("f", FunnelLevel::Paths, None)),
            DataType::Structure,
        ));
        let json = serde_json::to_string(&paths).unwrap();
        assert!(json.starts_with("{\"INST_BD\""));
        let back: Binding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, paths);

        let funnel = Binding::Funnel(BoundPath::new(
            Path::Funnel(FunnelPath::new("f", FunnelLevel::Funnel, None)),
            DataType::Structure,
        ));
        let json = serde_json::to_string(&funnel).unwrap();
        assert!(json.starts_with("{\"REF_SCAL_BD\""));
        assert!(matches!(serde_json::from_str::<Binding>(&json).unwrap(), Binding::Funnel(_)));
    }

    #[test]
    fn segment_binding_is_an_instance() {
        let seg = Binding::Segment(BoundPath::new(
            Path::Segment(SegmentPath {
                segment: "s".into(),
                field: None,
            }),
            DataType::Structure,
        ));
        assert_eq!(seg.relation_type(), RelationType::Instance);
        assert!(seg.is_collection());
        let json = serde_json::to_string(&seg).unwrap();
        assert!(matches!(serde_json::from_str::<Binding>(&json).unwrap(), Binding::Segment(_)));
    }
}
