//! Azure SQL Server table
//!
//! # Module Structure
//!
//! - [`models`] - Server and sub-resource shapes, the [`ServerRef`] capability
//! - [`servers`] - List (paged, limit-aware) and get (not-found tolerant)
//! - [`sub_resources`] - The per-kind enrichers and the per-session client holder
//! - [`table`] - Rows of `azure_sql_server`

pub mod models;
pub mod servers;
pub mod sub_resources;
pub mod table;

pub use models::{ProxyResource, Server, ServerGetResponse, ServerKey, ServerRef};
pub use servers::{ServerLister, ServersClient};
pub use sub_resources::{SqlClients, SubResourceClient, SubResourceKind};
pub use table::SqlServerTable;
