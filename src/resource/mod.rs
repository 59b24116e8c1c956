//! Resource abstraction layer
//!
//! Table schemas are data: column names, types, extraction paths and
//! enrichers are loaded from JSON files embedded at compile time.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`fetcher`] - Pages through ARM list calls
//! - [`row`] - Flattens fetched items into rows
//!
//! # Example
//!
//! ```ignore
//! use azsql::resource::{get_table, build_row, Hydrated, RowContext};
//!
//! let table = get_table("azure_sql_server").unwrap();
//! let columns = table.project(None)?;
//! let row = build_row(&columns, &server_json, &Hydrated::new(), ctx);
//! ```

pub mod fetcher;
mod registry;
mod row;

pub use fetcher::{extract_json_value, Pager};
pub use registry::*;
pub use row::{build_row, Hydrated, Row, RowContext};
