//! Row building
//!
//! Flattens a fetched item plus its hydrated sub-resources into a JSON
//! object keyed by column name.

use super::fetcher::extract_json_value;
use super::registry::{ColumnDef, ColumnType, Transform};
use crate::azure::http::format_arm_error;
use crate::azure::resource_id;
use crate::sql::{ProxyResource, SubResourceKind};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Session facts available to every row
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub subscription_id: &'a str,
    pub cloud_environment: &'a str,
}

/// Outcome of each enricher run for one parent
pub type Hydrated = HashMap<SubResourceKind, anyhow::Result<Vec<ProxyResource>>>;

/// One output row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub values: Map<String, Value>,
    /// Per-column failures; the column value is `null`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Build a row for `columns` out of `item` and its hydrate results.
///
/// A failed enricher only nulls its own column.
pub fn build_row(
    columns: &[&ColumnDef],
    item: &Value,
    hydrated: &Hydrated,
    ctx: RowContext<'_>,
) -> Row {
    let mut row = Row::default();

    for column in columns {
        let value = match column.hydrate {
            Some(kind) => match hydrated.get(&kind) {
                Some(Ok(resources)) => {
                    serde_json::to_value(resources).unwrap_or(Value::Null)
                }
                Some(Err(e)) => {
                    tracing::warn!("Column {} failed: {:#}", column.name, e);
                    row.errors
                        .insert(column.name.clone(), format_arm_error(e));
                    Value::Null
                }
                None => Value::Null,
            },
            None => column_value(column, item, ctx),
        };

        row.values.insert(column.name.clone(), value);
    }

    row
}

fn column_value(column: &ColumnDef, item: &Value, ctx: RowContext<'_>) -> Value {
    let raw = column
        .json_path
        .as_deref()
        .and_then(|path| extract_json_value(item, path))
        .cloned()
        .unwrap_or(Value::Null);

    let value = match column.transform {
        None => raw,
        Some(Transform::ToLower) => match raw {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other,
        },
        Some(Transform::IdToAkas) => match raw.as_str() {
            Some(id) => Value::from(resource_id::id_to_akas(id)),
            None => Value::Null,
        },
        Some(Transform::ResourceGroup) => raw
            .as_str()
            .and_then(|id| resource_id::resource_group_from_id(id).ok())
            .map(Value::from)
            .unwrap_or(Value::Null),
        Some(Transform::SubscriptionId) => Value::from(ctx.subscription_id),
        Some(Transform::CloudEnvironment) => Value::from(ctx.cloud_environment),
    };

    match (column.column_type, value) {
        (ColumnType::String, Value::Number(n)) => Value::String(n.to_string()),
        (ColumnType::String, Value::Bool(b)) => Value::String(b.to_string()),
        (ColumnType::String, v @ (Value::Array(_) | Value::Object(_))) => {
            Value::String(v.to_string())
        }
        (_, v) => v,
    }
}
