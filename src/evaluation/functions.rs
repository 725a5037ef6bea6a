//! The built-in function table.
//!
//! | function             | arguments                          | result        |
//! |----------------------|------------------------------------|---------------|
//! | `size`               | a collection path                  | LONG          |
//! | `datetime`           | a string                           | LONG          |
//! | `frequency`          | a collection path and a dimension  | LONG          |
//! | `enum`, `split`      | a value and one or more constants  | value's dtype |
//! | `lastPathIsComplete` | a funnel                           | BOOLEAN       |
//! | `lastPathStepTime`   | a funnel                           | LONG          |

use crate::ast::expressions::FunctionCall;
use crate::ast::{Binding, Constant, Expr, FunctionKind};
use crate::datatype::DataType;
use crate::error::{MotifError, Result};
use crate::evaluation::{EvalStack, Evaluation, Frame, fail};
use crate::path::{Path, lowest};
use crate::schema::RelationType;
use crate::symbols::PathSymbols;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

fn kind(call: &FunctionCall) -> Result<FunctionKind> {
    call.function
        .ok_or_else(|| MotifError::internal(format!("function '{}' is not bound", call.name)))
}

pub fn bind(call: &mut FunctionCall, symbols: &mut PathSymbols, stack: &mut EvalStack) -> Result<()> {
    let Some(function) = symbols.function(&call.name) else {
        return fail(call.location, format!("FunctionDefinition '{}' is not defined", call.name));
    };
    call.function = Some(function);
    for arg in &mut call.args {
        arg.bind(symbols, stack)?;
    }
    Ok(())
}

/// A path argument addressing something with instances to count.
fn collection_path(arg: &Expr) -> Option<&Binding> {
    let binding = arg.as_path()?.binding.as_ref()?;
    matches!(
        binding.relation_type(),
        RelationType::Instance | RelationType::ValueMap | RelationType::ValueVector
    )
    .then_some(binding)
}

fn funnel_arg(arg: &Expr) -> bool {
    matches!(arg.as_path().and_then(|p| p.binding.as_ref()), Some(Binding::Funnel(_)))
}

pub fn validate(call: &mut FunctionCall, symbols: &mut PathSymbols, scope: &Path, stack: &mut EvalStack) -> Result<()> {
    for arg in &mut call.args {
        arg.validate(symbols, scope, stack)?;
    }
    let function = kind(call)?;
    let name = function.name();
    let location = call.location;
    let args = &call.args;

    match function {
        FunctionKind::Size => {
            if args.len() != 1 {
                return fail(location, format!("Function {name} requires a single collection argument"));
            }
            if args[0].as_path().is_none() {
                return fail(location, format!("'{name}' argument '{}' must refer to a path", args[0].motif()));
            }
            if collection_path(&args[0]).is_none() {
                return fail(location, format!("'{name}' path argument '{}' must refer to a collection", args[0].motif()));
            }
        }
        FunctionKind::DateTime => {
            if args.len() != 1 {
                return fail(location, format!("Function {name} requires a string argument"));
            }
            if args[0].dtype()? != DataType::String {
                return fail(
                    location,
                    format!("'{name}' argument '{}' must refer to a string expression", args[0].motif()),
                );
            }
        }
        FunctionKind::Frequency => {
            if args.len() != 2 {
                return fail(location, format!("{name} requires a numeric expression and a target"));
            }
            if args[0].as_path().is_none() {
                return fail(location, format!("{name} expression '{}' must refer to a path", args[0].motif()));
            }
            if collection_path(&args[0]).is_none() {
                return fail(location, format!("{name} path '{}' must refer to an instance", args[0].motif()));
            }
            if args[0].eval_point()? == args[1].eval_point()? {
                return fail(
                    location,
                    format!("{name} expression '{}' evaluates at the same level as '{}'", args[1].motif(), args[0].motif()),
                );
            }
            if !stack.within(Frame::Target) {
                return fail(location, format!("{name} may only be used in a target"));
            }
        }
        FunctionKind::Enum | FunctionKind::Split => {
            if args.len() < 2 {
                return fail(location, format!("{name} requires a relation and one or more values"));
            }
            let target = args[0].dtype()?;
            if !target.is_numeric() && target != DataType::String {
                return fail(location, format!("{name} path '{}' expression must be a numeric or string", args[0].motif()));
            }
            for value in &args[1..] {
                if !value.can_reduce_to_constant() {
                    return fail(location, format!("{name} parameter '{}' must reduce to a constant", value.motif()));
                }
                if !DataType::has_common(value.dtype()?, target) {
                    return fail(
                        location,
                        format!("{name} parameter '{}' must match the type of '{}'", value.motif(), args[0].motif()),
                    );
                }
            }
        }
        FunctionKind::LastPathIsComplete | FunctionKind::LastPathStepTime => {
            if args.len() != 1 {
                return fail(location, format!("Function {name} requires a funnel name argument"));
            }
            if !funnel_arg(&args[0]) {
                return fail(location, format!("'{name}' argument '{}' must be a funnel name", args[0].motif()));
            }
        }
    }
    Ok(())
}

pub fn dtype(call: &FunctionCall) -> Result<DataType> {
    Ok(match kind(call)? {
        FunctionKind::Size | FunctionKind::DateTime | FunctionKind::Frequency | FunctionKind::LastPathStepTime => {
            DataType::Long
        }
        FunctionKind::LastPathIsComplete => DataType::Boolean,
        FunctionKind::Enum | FunctionKind::Split => match call.args.first() {
            Some(target) => target.dtype()?,
            None => DataType::Null,
        },
    })
}

/// Functions evaluate at the structure above their lowest argument.
pub fn eval_point(call: &FunctionCall) -> Result<Path> {
    let points = call.args.iter().map(Expr::eval_point).collect::<Result<Vec<_>>>()?;
    if points.is_empty() {
        return Ok(Path::Constant);
    }
    lowest(points.iter()).map(|p| p.parent()).ok_or_else(|| {
        MotifError::parse(
            call.location,
            format!("the arguments of '{}' are not on the same axis", call.name),
        )
    })
}

pub fn can_reduce(call: &FunctionCall) -> bool {
    call.function == Some(FunctionKind::DateTime) && call.args.len() == 1 && call.args[0].can_reduce_to_constant()
}

pub fn reduce(call: &FunctionCall) -> Result<Constant> {
    if !can_reduce(call) {
        return Err(MotifError::internal(format!("function '{}' cannot be reduced to a constant", call.name)));
    }
    let arg = call.args[0].reduce_to_constant()?;
    let parsed = arg.as_str().and_then(parse_datetime);
    match parsed {
        Some(millis) => Ok(Constant::Long(millis)),
        None => fail(
            call.location,
            format!("'{}' unable to parse constant '{}' as a date time string", call.name, arg.motif()),
        ),
    }
}

/// Milliseconds since the epoch of an ISO-8601 date or date-time. Text
/// without an offset is read as UTC.
pub fn parse_datetime(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
