//! Path accessor resolution.

use crate::ast::{Binding, BoundPath, PathAccessor};
use crate::datatype::DataType;
use crate::error::{Location, Result};
use crate::evaluation::{EvalStack, Evaluation, fail};
use crate::path::{FunnelLevel, FunnelPath, MapAccess, Path, SegmentPath, TargetPath};
use crate::schema::{RelationType, SchemaResolution};
use crate::symbols::{PathResolution, PathSymbols};
use tracing::trace;

/// Resolve `accessor` and record its binding.
pub fn bind_path(accessor: &mut PathAccessor, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
    let text = accessor.full_path();
    let location = accessor.location;

    let key = match accessor.key.as_deref_mut() {
        Some(key) => {
            key.bind(symbols, stack)?;
            if !key.can_reduce_to_constant() {
                return fail(location, format!("map key '{}' of '{text}' must be a constant", key.motif()));
            }
            Some(key.reduce_to_constant()?)
        }
        None => None,
    };
    let key_text = key.as_ref().map(|k| k.value_text());

    let resolution = symbols
        .path(&accessor.components, key_text.as_deref())
        .or_else(|message| fail(location, message))?;

    let binding = match resolution {
        Some(PathResolution::Schema(resolved)) => schema_binding(resolved, &text, location)?,
        Some(PathResolution::Funnel(path)) => {
            if key.is_some() {
                return fail(location, format!("funnel path '{text}' cannot have a map key"));
            }
            funnel_binding(path)
        }
        Some(PathResolution::Segment(path)) => {
            if key.is_some() {
                return fail(location, format!("segment path '{text}' cannot have a map key"));
            }
            segment_binding(path)
        }
        None => match (accessor.components.as_slice(), symbols.target(&text)) {
            ([name], Some(target)) if key.is_none() => Binding::Target(BoundPath::new(
                Path::Target(TargetPath { name: name.clone() }),
                target.dtype,
            )),
            _ => return fail(location, format!("could not bind path '{text}'")),
        },
    };

    if let (Some(key), Binding::ValueMap { key_dtype, .. }) = (&key, &binding) {
        let compatible = DataType::has_common(key.dtype(), *key_dtype)
            || (key.dtype() == DataType::String && key_dtype.can_coerce(&key.value_text()));
        if !compatible {
            return fail(
                location,
                format!("map key '{}' is not compatible with the key type {key_dtype} of '{text}'", key.motif()),
            );
        }
    }

    trace!(path = %text, binding = binding.explain_name(), "bound path");
    accessor.binding = Some(binding);
    Ok(())
}

fn schema_binding(resolved: SchemaResolution, text: &str, location: Location) -> Result<Binding> {
    let Some(relation) = resolved.relation else {
        return Ok(Binding::Instance(BoundPath::new(Path::Schema(resolved.path), DataType::Structure)));
    };
    let access = resolved.path.access;
    let path = Path::Schema(resolved.path);
    Ok(match relation.rtype {
        RelationType::ValueScalar => Binding::ValueScalar(BoundPath::new(path, relation.dtype)),
        RelationType::ValueVector => Binding::ValueVector(BoundPath::new(path, relation.dtype)),
        RelationType::ValueMap => {
            let key_dtype = relation.key_dtype.unwrap_or(DataType::String);
            let dtype = match access {
                MapAccess::Key => key_dtype,
                _ => relation.dtype,
            };
            Binding::ValueMap {
                bound: BoundPath::new(path, dtype),
                key_dtype,
            }
        }
        RelationType::ReferenceScalar => Binding::ReferenceScalar(BoundPath::new(path, DataType::Structure)),
        RelationType::ReferenceVector => Binding::ReferenceVector(BoundPath::new(path, DataType::Structure)),
        RelationType::Instance | RelationType::Target => {
            return fail(location, format!("relation '{}' of '{text}' has an unexpected kind", relation.name));
        }
    })
}

fn funnel_binding(path: FunnelPath) -> Binding {
    let level = path.level;
    match path.field.as_deref() {
        Some(field) => {
            let dtype = funnel_field_dtype(field);
            Binding::ValueScalar(BoundPath::new(Path::Funnel(path), dtype))
        }
        None => {
            let bound = BoundPath::new(Path::Funnel(path), DataType::Structure);
            match level {
                FunnelLevel::Funnel => Binding::Funnel(bound),
                FunnelLevel::Paths => Binding::FunnelPaths(bound),
                FunnelLevel::Steps => Binding::FunnelSteps(bound),
            }
        }
    }
}

/// `is*` flags are booleans, every other funnel field is a long.
fn funnel_field_dtype(field: &str) -> DataType {
    if field.starts_with("is") {
        DataType::Boolean
    } else {
        DataType::Long
    }
}

fn segment_binding(path: SegmentPath) -> Binding {
    match path.field {
        Some(_) => Binding::ValueScalar(BoundPath::new(Path::Segment(path), DataType::Long)),
        None => Binding::Segment(BoundPath::new(Path::Segment(path), DataType::Structure)),
    }
}
