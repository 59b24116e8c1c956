//! Table Registry - Load table definitions from JSON
//!
//! This module loads the table schemas from embedded JSON files and provides
//! lookup functions for the rest of the crate.

use crate::azure::error::IgnoreConfig;
use crate::sql::SubResourceKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Embedded table JSON files (compiled into the binary)
const TABLE_FILES: &[&str] = &[include_str!("../resources/azure_sql_server.json")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Json,
}

/// Post-extraction transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Lower-case a string value
    ToLower,
    /// Resource id -> `[lower(id)]`
    IdToAkas,
    /// Resource id -> resource group name
    ResourceGroup,
    /// Subscription of the session (ignores `json_path`)
    SubscriptionId,
    /// Cloud environment of the session (ignores `json_path`)
    CloudEnvironment,
}

/// Column definition from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub description: String,
    /// Dot path into the serialized item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Sub-resource enricher that computes this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydrate: Option<SubResourceKind>,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub description: String,
    /// Columns that together address one row in a point lookup
    pub key_columns: Vec<String>,
    /// Error codes the point lookup treats as "no row"
    #[serde(default)]
    pub ignore_error_codes: Vec<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn ignore_config(&self) -> IgnoreConfig {
        IgnoreConfig::new(self.ignore_error_codes.iter().cloned())
    }

    /// Resolve a column projection. `None` or an empty list selects every
    /// column; unknown names are an error.
    pub fn project(&self, names: Option<&[String]>) -> Result<Vec<&ColumnDef>> {
        let Some(names) = names.filter(|n| !n.is_empty()) else {
            return Ok(self.columns.iter().collect());
        };

        names
            .iter()
            .map(|name| {
                self.column(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown column: {}", name))
            })
            .collect()
    }

    /// Enrichers needed to fill `columns`
    pub fn hydrate_kinds(columns: &[&ColumnDef]) -> BTreeSet<SubResourceKind> {
        columns.iter().filter_map(|c| c.hydrate).collect()
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub tables: HashMap<String, TableDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<TableConfig> = OnceLock::new();

/// Get the table registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static TableConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = TableConfig {
            tables: HashMap::new(),
        };

        for content in TABLE_FILES {
            let partial: TableConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded table JSON: {}", e));
            final_config.tables.extend(partial.tables);
        }

        final_config
    })
}

/// Get a table definition by name
pub fn get_table(name: &str) -> Option<&'static TableDef> {
    get_registry().tables.get(name)
}

/// Get all table names
pub fn get_all_table_names() -> Vec<&'static str> {
    let mut names: Vec<&str> = get_registry().tables.keys().map(|s| s.as_str()).collect();
    names.sort_unstable();
    names
}
