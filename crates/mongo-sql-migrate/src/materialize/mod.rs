//! The two write passes: rows first, then links.
//!
//! Every model's rows must exist before any model's links are written, since
//! a link may point at a document of a model processed later. The
//! orchestrator enforces that barrier; the functions here handle one model of
//! one pass each.

mod links;
mod rows;

pub use links::materialize_links;
pub use rows::{build_row, materialize_rows, scalar_value};

use serde::Serialize;
use serde_json::Value;

use crate::error::{MigrateError, Result};

/// Per-model write counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    /// Documents read in the row pass.
    pub documents: u64,
    /// Rows inserted into the model's own table.
    pub rows: u64,
    /// Join, component, attachment and morph rows inserted.
    pub links: u64,
    /// Inline foreign keys set on existing rows.
    pub updates: u64,
}

/// Source key carried by a reference value: a bare key, or an object with
/// `ref` or `_id`. `None` for null and empty values.
pub(crate) fn reference_key(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Object(obj) => match obj.get("ref").or_else(|| obj.get("_id")) {
            Some(inner) => reference_key(inner),
            None => Err(MigrateError::Source(format!(
                "reference object without ref or _id: {}",
                value
            ))),
        },
        other => Err(MigrateError::Source(format!(
            "unsupported reference value: {}",
            other
        ))),
    }
}

/// A list-valued field; a single value counts as a one-element list.
pub(crate) fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}
