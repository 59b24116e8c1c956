//! Configuration Management
//!
//! Handles persistent configuration storage for azsql.
//! Secrets never live here; the client secret comes from `AZURE_CLIENT_SECRET`.

use crate::azure::auth::{DEFAULT_AUTHORITY_HOST, DEFAULT_MANAGEMENT_ENDPOINT};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output encodings for rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One pretty-printed JSON array
    #[default]
    Json,
    /// One compact JSON object per line, written as rows arrive
    Jsonl,
    Yaml,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Subscription to query
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Tenant of the service principal
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Application (client) id of the service principal
    #[serde(default)]
    pub client_id: Option<String>,
    /// Resource Manager endpoint, for sovereign clouds
    #[serde(default)]
    pub management_endpoint: Option<String>,
    /// Entra ID authority, for sovereign clouds
    #[serde(default)]
    pub authority_host: Option<String>,
    #[serde(default)]
    pub output: Option<OutputFormat>,
    /// Rows hydrated concurrently by `list`
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azsql").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {:#}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Parse configuration JSON
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse config JSON")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective subscription (CLI > config > environment / az profile)
    pub fn effective_subscription(&self) -> String {
        self.subscription_id
            .clone()
            .or_else(crate::azure::auth::get_default_subscription)
            .unwrap_or_default()
    }

    /// Subscription for this run: `cli` wins over the effective subscription.
    /// The result must be a GUID.
    pub fn resolve_subscription(&self, cli: Option<&str>) -> Result<String> {
        let subscription = match cli {
            Some(subscription) => subscription.trim().to_string(),
            None => self.effective_subscription(),
        };

        if subscription.is_empty() {
            return Err(anyhow::anyhow!(
                "No Azure subscription configured. Set AZURE_SUBSCRIPTION_ID, run 'az account set', or use --subscription"
            ));
        }

        if !crate::azure::auth::validate_subscription_id(&subscription) {
            return Err(anyhow::anyhow!(
                "Invalid subscription ID: {} (expected a GUID)",
                subscription
            ));
        }

        Ok(subscription)
    }

    pub fn effective_management_endpoint(&self) -> String {
        self.management_endpoint
            .clone()
            .or_else(|| std::env::var("AZURE_MANAGEMENT_ENDPOINT").ok())
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string())
    }

    pub fn effective_authority_host(&self) -> String {
        self.authority_host
            .clone()
            .or_else(|| std::env::var("AZURE_AUTHORITY_HOST").ok())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
    }

    pub fn effective_output(&self) -> OutputFormat {
        self.output.unwrap_or_default()
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .filter(|c| *c > 0)
            .unwrap_or(crate::sql::table::DEFAULT_CONCURRENCY)
    }
}
