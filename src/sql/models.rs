//! Microsoft.Sql resource shapes
//!
//! Only the fields the table reads are typed; everything else the backend
//! sends is kept in `extra` maps so serializing a record loses nothing.

use crate::azure::error::ArmError;
use crate::azure::resource_id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A logical SQL server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ServerProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login: Option<String>,
    /// Write-only on the backend; reads come back empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A resource owned by a server: firewall rule, audit policy, ...
///
/// The sub-resource kinds differ only in `properties`, which is passed
/// through untouched into the nested JSON column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of a list call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Anything that identifies a SQL server: a listed server, a get response,
/// or an explicit key.
pub trait ServerRef {
    fn name(&self) -> Option<&str>;
    fn id(&self) -> Option<&str>;

    /// Name and resource group, both non-empty
    fn server_scope(&self) -> Result<(&str, &str), ArmError> {
        let name = self
            .name()
            .filter(|n| !n.is_empty())
            .ok_or(ArmError::IncompleteReference("server name is missing"))?;
        let id = self
            .id()
            .filter(|i| !i.is_empty())
            .ok_or(ArmError::IncompleteReference("server id is missing"))?;
        let resource_group = resource_id::resource_group_from_id(id)?;
        Ok((name, resource_group))
    }
}

impl ServerRef for Server {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl<T: ServerRef + ?Sized> ServerRef for &T {
    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn id(&self) -> Option<&str> {
        (**self).id()
    }
}

/// The result of a point lookup
///
/// Serializes exactly like the server it wraps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerGetResponse {
    #[serde(flatten)]
    pub server: Server,
    #[serde(skip)]
    pub request_id: Option<String>,
}

impl ServerRef for ServerGetResponse {
    fn name(&self) -> Option<&str> {
        self.server.name()
    }

    fn id(&self) -> Option<&str> {
        self.server.id()
    }
}

/// A server addressed by its coordinates rather than a fetched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKey {
    name: String,
    id: String,
}

impl ServerKey {
    pub fn new(subscription_id: &str, resource_group: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: resource_id::sql_server_id(subscription_id, resource_group, name),
        }
    }
}

impl ServerRef for ServerKey {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}
