//! HTTP utilities for Azure Resource Manager REST calls

use super::error::ArmError;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

pub const USER_AGENT: &str = concat!("azsql/", env!("CARGO_PKG_VERSION"));

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A decoded ARM response
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub body: Value,
    /// `x-ms-request-id`, useful when raising support tickets
    pub request_id: Option<String>,
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request to an ARM API
    pub async fn get(&self, url: &str, token: &str) -> Result<ArmResponse> {
        let client_request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("GET {} (client request id {})", url, client_request_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", &client_request_id)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ArmError::from)
            .context("Failed to send request")?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-ms-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(ArmError::from)
            .context("Failed to read response body")?;

        if !status.is_success() {
            // 404s are routine: point lookups of missing servers
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(ArmError::from_response(status.as_u16(), &body).into());
        }

        // Some endpoints answer 200/204 with no content
        if body.trim().is_empty() {
            return Ok(ArmResponse {
                body: Value::Null,
                request_id,
            });
        }

        let body = serde_json::from_str(&body)
            .map_err(ArmError::from)
            .context("Failed to parse response JSON")?;

        Ok(ArmResponse { body, request_id })
    }
}

/// Format an ARM error for display
pub fn format_arm_error(error: &anyhow::Error) -> String {
    let Some(arm) = ArmError::from_anyhow(error) else {
        return truncate_message(&error.to_string());
    };

    match arm {
        ArmError::Api { status: 401, .. } => {
            "Authentication failed. Run 'az login' or check AZURE_CLIENT_SECRET.".to_string()
        }
        ArmError::Api { status: 403, .. } => {
            "Permission denied. Check the role assignments on the subscription.".to_string()
        }
        ArmError::Api { status: 404, .. } => "Resource not found.".to_string(),
        ArmError::Api { status: 429, .. } => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        ArmError::Api { status, .. } if *status >= 500 => {
            "Azure service temporarily unavailable. Please try again.".to_string()
        }
        ArmError::Api { code, message, .. } => {
            truncate_message(&format!("{}: {}", code, message))
        }
        ArmError::Cancelled => "Request cancelled.".to_string(),
        other => truncate_message(&other.to_string()),
    }
}

fn truncate_message(message: &str) -> String {
    let mut printable = message
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ');
    let sanitized = printable.by_ref().take(120).collect::<String>();

    if printable.next().is_some() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
