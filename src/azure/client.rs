//! ARM Client
//!
//! Main client for interacting with Azure Resource Manager, combining
//! authentication, HTTP functionality and the subscription scope.

use super::auth::{AzureCredentials, DEFAULT_MANAGEMENT_ENDPOINT};
use super::http::{ArmHttpClient, ArmResponse};
use crate::query::QueryContext;
use anyhow::{Context, Result};

/// API version for the Microsoft.Sql resource provider
pub const SQL_API_VERSION: &str = "2021-11-01";

/// Main ARM client, scoped to one subscription
///
/// Read-only after construction and cheap to clone; clones share the
/// token cache and the connection pool.
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    endpoint: String,
    cloud_environment: String,
}

impl ArmClient {
    /// Create a new client for the public cloud
    pub fn new(subscription_id: &str, credentials: AzureCredentials) -> Result<Self> {
        Self::with_endpoint(subscription_id, credentials, DEFAULT_MANAGEMENT_ENDPOINT)
    }

    /// Create a client against a specific Resource Manager endpoint
    pub fn with_endpoint(
        subscription_id: &str,
        credentials: AzureCredentials,
        endpoint: &str,
    ) -> Result<Self> {
        if subscription_id.is_empty() {
            return Err(anyhow::anyhow!("Subscription ID must not be empty"));
        }

        let parsed = url::Url::parse(endpoint)
            .with_context(|| format!("Invalid management endpoint: {}", endpoint))?;
        let cloud_environment = cloud_environment_for(&parsed);

        let http = ArmHttpClient::new()?;

        Ok(Self {
            credentials,
            http,
            subscription_id: subscription_id.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cloud_environment,
        })
    }

    /// Name of the Azure cloud this client talks to, e.g. `AzurePublicCloud`
    pub fn cloud_environment(&self) -> &str {
        &self.cloud_environment
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Make a GET request, honoring the query's cancellation
    pub async fn get(&self, url: &str, ctx: &QueryContext) -> Result<ArmResponse> {
        ctx.run(async {
            let token = self.get_token().await?;
            self.http.get(url, &token).await
        })
        .await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a subscription-scoped URL with the SQL api-version
    pub fn subscription_url(&self, path: &str) -> String {
        format!(
            "{}/subscriptions/{}/{}?api-version={}",
            self.endpoint,
            urlencoding::encode(&self.subscription_id),
            path.trim_start_matches('/'),
            SQL_API_VERSION
        )
    }

    /// All SQL servers in the subscription
    pub fn sql_servers_url(&self) -> String {
        self.subscription_url("providers/Microsoft.Sql/servers")
    }

    /// A single SQL server
    pub fn sql_server_url(&self, resource_group: &str, name: &str) -> String {
        self.subscription_url(&sql_server_path(resource_group, name))
    }

    /// A collection nested under a SQL server, e.g. `firewallRules`
    pub fn sql_server_child_url(&self, resource_group: &str, name: &str, collection: &str) -> String {
        self.subscription_url(&format!(
            "{}/{}",
            sql_server_path(resource_group, name),
            collection
        ))
    }

    /// Resolve a `nextLink`. ARM returns absolute links; relative ones are
    /// joined onto the endpoint.
    pub fn resolve_link(&self, link: &str) -> Result<String> {
        if link.starts_with("http://") || link.starts_with("https://") {
            return Ok(link.to_string());
        }
        let base = url::Url::parse(&format!("{}/", self.endpoint))
            .with_context(|| format!("Invalid management endpoint: {}", self.endpoint))?;
        let joined = base
            .join(link.trim_start_matches('/'))
            .with_context(|| format!("Invalid nextLink: {}", link))?;
        Ok(joined.to_string())
    }
}

fn sql_server_path(resource_group: &str, name: &str) -> String {
    format!(
        "resourceGroups/{}/providers/Microsoft.Sql/servers/{}",
        urlencoding::encode(resource_group),
        urlencoding::encode(name)
    )
}

fn cloud_environment_for(endpoint: &url::Url) -> String {
    let name = match endpoint.host_str() {
        Some("management.azure.com") => "AzurePublicCloud",
        Some("management.chinacloudapi.cn") => "AzureChinaCloud",
        Some("management.usgovcloudapi.net") => "AzureUSGovernmentCloud",
        _ => "AzureCustomCloud",
    };
    name.to_string()
}
