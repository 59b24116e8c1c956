//! azsql - Azure SQL Server inventory
//!
//! Lists Azure SQL servers in a subscription and flattens each one, together
//! with its security-related sub-resources, into a row of the
//! `azure_sql_server` table.
//!
//! # Example
//!
//! ```ignore
//! use azsql::azure::{auth::{AzureCredentials, TokenSource}, client::ArmClient};
//! use azsql::query::QueryContext;
//! use azsql::sql::{SqlClients, SqlServerTable};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let creds = AzureCredentials::new(TokenSource::from_env(None, None))?;
//!     let client = ArmClient::new("00000000-0000-0000-0000-000000000000", creds)?;
//!     let table = SqlServerTable::new(SqlClients::new(client))?;
//!     let ctx = QueryContext::new().with_limit(Some(10));
//!     let mut lister = table.clients().servers().list(&ctx);
//!     while let Some(server) = lister.next().await? {
//!         println!("{:?}", server.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod azure;
pub mod config;
pub mod query;
pub mod resource;
pub mod sql;
