//! Tagged JSON for syntax trees.
//!
//! Every node is written as a single-entry object keyed by its tag:
//!
//! ```text
//! {"VIEW": {"name": "recent", "rules": [{"EDIT_RL": {...}}], "location": {...}}}
//! ```
//!
//! Enum nodes get their tags from variant names. Struct nodes that stand
//! alone on the wire (views, selects, targets, segment and step
//! definitions, statement lists) are wrapped here by [`tagged_node!`].
//! Output is deterministic: struct fields keep declaration order.

use crate::ast::{Expr, FilterRule, Funnel, Query, Segment, SegmentDefinition, Select, Statement, Statements, StepDefinition, Target, View};
use crate::error::Result;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialize and deserialize a `#[serde(remote = "Self")]` struct under a
/// fixed tag.
macro_rules! tagged_node {
    ($ty:ty, $tag:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                struct Body<'a>(&'a $ty);

                impl Serialize for Body<'_> {
                    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                        <$ty>::serialize(self.0, serializer)
                    }
                }

                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry($tag, &Body(self))?;
                map.end()
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                struct Body($ty);

                impl<'de> Deserialize<'de> for Body {
                    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                        <$ty>::deserialize(deserializer).map(Body)
                    }
                }

                let mut entries = BTreeMap::<String, Body>::deserialize(deserializer)?.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((tag, body)), None) if tag == $tag => Ok(body.0),
                    (Some((tag, _)), None) => Err(de::Error::custom(format!(
                        "expected node tag '{}', found '{tag}'",
                        $tag
                    ))),
                    _ => Err(de::Error::custom(format!("{} must be a single tagged entry", $tag))),
                }
            }
        }
    };
}

tagged_node!(View, "VIEW");
tagged_node!(Statements, "STATEMENTS");
tagged_node!(Select, "SELECT");
tagged_node!(Target, "TARGET");
tagged_node!(SegmentDefinition, "SEGMENT_DEINITION");
tagged_node!(StepDefinition, "TRIGGERED_STEP_DEFINITION");

pub fn to_json<T: Serialize>(node: &T) -> Result<String> {
    Ok(serde_json::to_string(node)?)
}

pub fn to_json_pretty<T: Serialize>(node: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(node)?)
}

pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// A syntax tree with a JSON wire form.
pub trait JsonNode: Serialize + DeserializeOwned {
    fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    fn to_json_pretty(&self) -> Result<String> {
        to_json_pretty(self)
    }

    fn from_json(text: &str) -> Result<Self> {
        from_json(text)
    }
}

impl JsonNode for Expr {}
impl JsonNode for FilterRule {}
impl JsonNode for View {}
impl JsonNode for Query {}
impl JsonNode for Segment {}
impl JsonNode for Funnel {}
impl JsonNode for Statement {}
impl JsonNode for Statements {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotifError;
    use crate::parser::Parser;

    #[test]
    fn views_are_wrapped_in_their_tag() {
        let view = Parser::new("view v { include user where user.id > 3 }")
            .and_then(|mut p| p.parse_view())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&view.to_json().unwrap()).unwrap();
        assert_eq!(json["VIEW"]["name"], "v");
        assert!(json["VIEW"]["rules"][0]["EDIT_RL"]["where"]["VAL_COMP_BE"].is_object());
        assert_eq!(View::from_json(&view.to_json().unwrap()).unwrap(), view);
    }

    #[test]
    fn statement_tags_keep_their_spelling() {
        let text = "segment s { segment 1 when user.id > 3 } from schema quo;
                    funnel f { step 1 when user.id == 1 1 } from schema quo";
        let statements = Parser::new(text).and_then(|mut p| p.parse_statements()).unwrap();
        let json = statements.to_json_pretty().unwrap();
        assert!(json.contains("\"STATEMENTS\""));
        assert!(json.contains("\"SEGMENT_DEINITION\""));
        assert!(json.contains("\"TRIGGERED_STEP_DEFINITION\""));
        assert!(json.contains("\"FUNNEL_DEFINITION_STEPID\""));
        assert_eq!(Statements::from_json(&json).unwrap(), statements);
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let result = View::from_json(r#"{"SELECT": {"name": "v", "rules": []}}"#);
        assert!(matches!(result, Err(MotifError::Json(_))));
        let result = View::from_json(r#"{"VIEW": {"name": "v", "rules": []}, "SELECT": {}}"#);
        assert!(matches!(result, Err(MotifError::Json(_))));
    }
}
