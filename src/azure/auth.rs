//! Azure Authentication
//!
//! Acquires bearer tokens for Azure Resource Manager from, in order:
//! a pre-acquired token (`AZURE_ACCESS_TOKEN`), a service principal
//! (`AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`), or the
//! Azure CLI. Also resolves the default subscription from the CLI profile.

use super::error::ArmError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Public cloud Resource Manager endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Public cloud Entra ID authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// TTL for pre-acquired tokens whose expiry we cannot see
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Where tokens come from
#[derive(Clone)]
pub enum TokenSource {
    /// A token acquired elsewhere; never refreshed.
    Static(String),
    /// OAuth2 client-credentials grant for a service principal.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// `az account get-access-token`
    AzureCli,
}

impl std::fmt::Debug for TokenSource {
    // Secrets stay out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static(..)"),
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            TokenSource::AzureCli => f.write_str("AzureCli"),
        }
    }
}

impl TokenSource {
    /// Pick a token source from the environment.
    /// `tenant_id` / `client_id` fill in for missing environment variables.
    pub fn from_env(tenant_id: Option<&str>, client_id: Option<&str>) -> Self {
        if let Some(token) = non_empty_env("AZURE_ACCESS_TOKEN") {
            return TokenSource::Static(token);
        }

        let tenant = non_empty_env("AZURE_TENANT_ID").or_else(|| tenant_id.map(str::to_string));
        let client = non_empty_env("AZURE_CLIENT_ID").or_else(|| client_id.map(str::to_string));
        let secret = non_empty_env("AZURE_CLIENT_SECRET");

        match (tenant, client, secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => TokenSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            },
            _ => TokenSource::AzureCli,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Azure credentials holder with token caching
///
/// Clones share the token cache, so one instance can serve every concurrent
/// request of a session.
#[derive(Clone)]
pub struct AzureCredentials {
    source: TokenSource,
    authority_host: String,
    management_endpoint: String,
    http: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, lifetime: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER),
        }
    }

    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Unix seconds; only present in newer CLI versions
    #[serde(default)]
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
    /// Local time, "2024-01-01 12:00:00.000000"
    #[serde(default)]
    expires_on: Option<String>,
}

impl AzureCredentials {
    /// Create credentials for the public cloud.
    pub fn new(source: TokenSource) -> Result<Self> {
        Self::with_endpoints(source, DEFAULT_AUTHORITY_HOST, DEFAULT_MANAGEMENT_ENDPOINT)
    }

    /// Create credentials for a specific cloud (or a test server).
    pub fn with_endpoints(
        source: TokenSource,
        authority_host: &str,
        management_endpoint: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(super::http::USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::debug!("Using token source {:?}", source);

        Ok(Self {
            source,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            management_endpoint: management_endpoint.trim_end_matches('/').to_string(),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Shortcut for a pre-acquired token.
    pub fn from_static_token(token: &str) -> Result<Self> {
        Self::new(TokenSource::Static(token.to_string()))
    }

    /// The OAuth2 scope for Resource Manager
    pub fn scope(&self) -> String {
        format!("{}/.default", self.management_endpoint)
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        // Hold the write lock across acquisition so concurrent misses share one fetch
        let mut cache = self.token_cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
            return Ok(cached.token.clone());
        }

        let (token, lifetime) = self.acquire().await?;
        *cache = Some(CachedToken::new(token.clone(), lifetime));
        drop(cache);

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }

    async fn acquire(&self) -> Result<(String, Duration)> {
        match &self.source {
            TokenSource::Static(token) => Ok((token.clone(), DEFAULT_TOKEN_TTL)),
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.acquire_client_secret(tenant_id, client_id, client_secret)
                    .await
            }
            TokenSource::AzureCli => self.acquire_cli().await,
        }
    }

    async fn acquire_client_secret(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(String, Duration)> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host,
            urlencoding::encode(tenant_id)
        );
        let scope = self.scope();

        tracing::debug!("POST {}", token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&form)
            .send()
            .await
            .map_err(ArmError::from)
            .context("Failed to request access token")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read token response body")?;

        if !status.is_success() {
            tracing::error!(
                "Token request failed: {} - {}",
                status,
                super::http::sanitize_for_log(&body)
            );
            return Err(ArmError::Authentication(format!(
                "token endpoint returned {}",
                status.as_u16()
            ))
            .into());
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).context("Failed to parse token response")?;
        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok((parsed.access_token, lifetime))
    }

    async fn acquire_cli(&self) -> Result<(String, Duration)> {
        let resource = format!("{}/", self.management_endpoint);
        tracing::debug!("az account get-access-token --resource {}", resource);

        let output = tokio::process::Command::new(az_executable())
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(&resource)
            .output()
            .await
            .map_err(|e| ArmError::Authentication(format!("failed to run Azure CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                "Azure CLI token request failed: {}",
                super::http::sanitize_for_log(&stderr)
            );
            return Err(ArmError::Authentication(
                "Azure CLI could not issue a token. Run 'az login' or set AZURE_CLIENT_SECRET"
                    .to_string(),
            )
            .into());
        }

        let parsed: CliTokenResponse =
            serde_json::from_slice(&output.stdout).context("Failed to parse Azure CLI output")?;
        let lifetime = cli_token_lifetime(&parsed, chrono::Utc::now());

        Ok((parsed.access_token, lifetime))
    }
}

fn az_executable() -> &'static str {
    if cfg!(windows) {
        "az.cmd"
    } else {
        "az"
    }
}

/// Remaining lifetime of a CLI-issued token
fn cli_token_lifetime(parsed: &CliTokenResponse, now: chrono::DateTime<chrono::Utc>) -> Duration {
    use chrono::{Local, NaiveDateTime, TimeZone};

    let expires_at = parsed
        .expires_on_unix
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .or_else(|| {
            let raw = parsed.expires_on.as_deref()?;
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
            Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&chrono::Utc))
        });

    match expires_at {
        Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
        None => DEFAULT_TOKEN_TTL,
    }
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Subscription ids are GUIDs
pub fn validate_subscription_id(subscription: &str) -> bool {
    uuid::Uuid::parse_str(subscription).is_ok()
}

#[derive(Deserialize)]
struct AzureProfile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    #[serde(default)]
    is_default: bool,
}

/// Pick the default subscription out of an `azureProfile.json` document
fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let content = content.trim_start_matches('\u{feff}');
    let profile: AzureProfile = serde_json::from_str(content).ok()?;

    let subscription = profile.subscriptions.into_iter().find(|s| s.is_default)?;
    if validate_subscription_id(&subscription.id) {
        Some(subscription.id)
    } else {
        tracing::warn!("Invalid subscription ID format in azureProfile.json");
        None
    }
}

/// Read the default subscription from the environment or the Azure CLI profile
pub fn get_default_subscription() -> Option<String> {
    if let Some(subscription) = non_empty_env("AZURE_SUBSCRIPTION_ID") {
        if validate_subscription_id(&subscription) {
            return Some(subscription);
        }
        tracing::warn!("Invalid subscription ID format in AZURE_SUBSCRIPTION_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(profile_path).ok()?;
    default_subscription_from_profile(&content)
}
