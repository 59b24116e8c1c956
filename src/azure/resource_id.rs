//! Azure resource identifiers
//!
//! ARM ids are slash-delimited paths of the form
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`.

use super::error::ArmError;

/// Index of the resource group when the id is split on `/`.
/// The leading slash produces an empty segment 0.
const RESOURCE_GROUP_SEGMENT: usize = 4;
const SUBSCRIPTION_SEGMENT: usize = 2;

/// Extract the resource group name from a resource id
/// e.g., "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Sql/servers/srv1" -> "rg1"
pub fn resource_group_from_id(id: &str) -> Result<&str, ArmError> {
    match id.split('/').nth(RESOURCE_GROUP_SEGMENT) {
        Some(rg) if !rg.is_empty() => Ok(rg),
        _ => Err(ArmError::MalformedResourceId(id.to_string())),
    }
}

/// Extract the subscription id from a resource id
pub fn subscription_from_id(id: &str) -> Result<&str, ArmError> {
    match id.split('/').nth(SUBSCRIPTION_SEGMENT) {
        Some(sub) if !sub.is_empty() => Ok(sub),
        _ => Err(ArmError::MalformedResourceId(id.to_string())),
    }
}

/// Also-known-as identifiers for a resource: its lower-cased id.
pub fn id_to_akas(id: &str) -> Vec<String> {
    vec![id.to_lowercase()]
}

/// Build the canonical id of a SQL server.
pub fn sql_server_id(subscription_id: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}",
        subscription_id, resource_group, name
    )
}
