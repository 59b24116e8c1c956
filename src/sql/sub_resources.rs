//! Server sub-resources
//!
//! One enricher per sub-resource kind. Each takes an already-fetched parent,
//! derives the resource group from its id and materializes the full
//! "list by server" result for the parent row's nested JSON column.

use super::models::{ProxyResource, ServerRef};
use super::servers::ServersClient;
use crate::azure::client::ArmClient;
use crate::azure::error::IgnoreConfig;
use crate::query::QueryContext;
use crate::resource::Pager;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The collections nested under a SQL server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubResourceKind {
    AuditingPolicies,
    SecurityAlertPolicies,
    AzureAdAdministrators,
    VulnerabilityAssessments,
    FirewallRules,
    EncryptionProtectors,
    PrivateEndpointConnections,
    VirtualNetworkRules,
}

impl SubResourceKind {
    pub const ALL: [SubResourceKind; 8] = [
        SubResourceKind::AuditingPolicies,
        SubResourceKind::SecurityAlertPolicies,
        SubResourceKind::AzureAdAdministrators,
        SubResourceKind::VulnerabilityAssessments,
        SubResourceKind::FirewallRules,
        SubResourceKind::EncryptionProtectors,
        SubResourceKind::PrivateEndpointConnections,
        SubResourceKind::VirtualNetworkRules,
    ];

    /// ARM collection name under `.../servers/{name}/`
    pub fn collection(self) -> &'static str {
        match self {
            SubResourceKind::AuditingPolicies => "auditingSettings",
            SubResourceKind::SecurityAlertPolicies => "securityAlertPolicies",
            SubResourceKind::AzureAdAdministrators => "administrators",
            SubResourceKind::VulnerabilityAssessments => "vulnerabilityAssessments",
            SubResourceKind::FirewallRules => "firewallRules",
            SubResourceKind::EncryptionProtectors => "encryptionProtector",
            SubResourceKind::PrivateEndpointConnections => "privateEndpointConnections",
            SubResourceKind::VirtualNetworkRules => "virtualNetworkRules",
        }
    }

    /// Kebab-case key used in table definitions and on the command line
    pub fn key(self) -> &'static str {
        match self {
            SubResourceKind::AuditingPolicies => "auditing-policies",
            SubResourceKind::SecurityAlertPolicies => "security-alert-policies",
            SubResourceKind::AzureAdAdministrators => "azure-ad-administrators",
            SubResourceKind::VulnerabilityAssessments => "vulnerability-assessments",
            SubResourceKind::FirewallRules => "firewall-rules",
            SubResourceKind::EncryptionProtectors => "encryption-protectors",
            SubResourceKind::PrivateEndpointConnections => "private-endpoint-connections",
            SubResourceKind::VirtualNetworkRules => "virtual-network-rules",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SubResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        SubResourceKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SubResourceKind::ALL.iter().map(|k| k.key()).collect();
                anyhow::anyhow!(
                    "Unknown sub-resource kind: {} (expected one of: {})",
                    s,
                    known.join(", ")
                )
            })
    }
}

/// Lists one kind of sub-resource for any server
#[derive(Clone)]
pub struct SubResourceClient {
    client: ArmClient,
    kind: SubResourceKind,
}

impl SubResourceClient {
    pub fn new(client: ArmClient, kind: SubResourceKind) -> Self {
        Self { client, kind }
    }

    pub fn kind(&self) -> SubResourceKind {
        self.kind
    }

    /// Every sub-resource of this kind owned by `server`, across all pages.
    ///
    /// Any page failure fails the whole call; a server with no
    /// sub-resources yields an empty list.
    pub async fn list_by_server<S: ServerRef + ?Sized>(
        &self,
        server: &S,
        ctx: &QueryContext,
    ) -> Result<Vec<ProxyResource>> {
        let (name, resource_group) = server
            .server_scope()
            .with_context(|| format!("Cannot list {} for server", self.kind))?;

        tracing::trace!("list {} for SQL server {}/{}", self.kind, resource_group, name);

        let url = self
            .client
            .sql_server_child_url(resource_group, name, self.kind.collection());

        Pager::new(self.client.clone(), url, ctx.clone())
            .collect_all()
            .await
            .with_context(|| {
                format!(
                    "Failed to list {} for SQL server {}/{}",
                    self.kind, resource_group, name
                )
            })
    }
}

/// Every client the `azure_sql_server` table needs, built once per session
///
/// Read-only after construction; share it across tasks behind an `Arc` or
/// by cloning.
#[derive(Clone)]
pub struct SqlClients {
    arm: ArmClient,
    servers: ServersClient,
    sub_resources: [SubResourceClient; 8],
}

impl SqlClients {
    pub fn new(client: ArmClient) -> Self {
        let sub_resources =
            SubResourceKind::ALL.map(|kind| SubResourceClient::new(client.clone(), kind));
        Self {
            servers: ServersClient::new(client.clone()),
            arm: client,
            sub_resources,
        }
    }

    /// Errors the server point lookup treats as "no row"
    pub fn with_ignore_config(mut self, ignore: IgnoreConfig) -> Self {
        self.servers = self.servers.with_ignore_config(ignore);
        self
    }

    pub fn arm(&self) -> &ArmClient {
        &self.arm
    }

    pub fn servers(&self) -> &ServersClient {
        &self.servers
    }

    pub fn sub_resource(&self, kind: SubResourceKind) -> &SubResourceClient {
        &self.sub_resources[kind.index()]
    }

    /// Run the enricher for `kind` against `server`
    pub async fn hydrate<S: ServerRef + ?Sized>(
        &self,
        kind: SubResourceKind,
        server: &S,
        ctx: &QueryContext,
    ) -> Result<Vec<ProxyResource>> {
        self.sub_resource(kind).list_by_server(server, ctx).await
    }
}
