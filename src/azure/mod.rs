//! Azure Resource Manager interaction module
//!
//! This module provides the core functionality for talking to Azure Resource
//! Manager: authentication, the HTTP client and typed errors.
//!
//! # Module Structure
//!
//! - [`auth`] - Token acquisition (pre-acquired token, service principal, Azure CLI)
//! - [`client`] - Subscription-scoped ARM client and URL builders
//! - [`error`] - Typed ARM errors and not-found classification
//! - [`http`] - HTTP utilities for REST API calls
//! - [`resource_id`] - Resource identifier parsing
//!
//! # Example
//!
//! ```ignore
//! use azsql::azure::{auth::{AzureCredentials, TokenSource}, client::ArmClient};
//! use azsql::query::QueryContext;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let creds = AzureCredentials::new(TokenSource::from_env(None, None))?;
//!     let client = ArmClient::new("00000000-0000-0000-0000-000000000000", creds)?;
//!     let servers = client.get(&client.sql_servers_url(), &QueryContext::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod resource_id;
