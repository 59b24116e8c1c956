//! ARM error types
//!
//! Errors produced by the Azure Resource Manager layer. Callers above this
//! layer usually hold them inside an [`anyhow::Error`]; use
//! [`ArmError::from_anyhow`] to get the typed error back.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while talking to Azure Resource Manager.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The backend answered with a non-success status.
    #[error("API request failed: {status} {code}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// ARM error code, e.g. `ResourceNotFound`. Empty if the body had none.
        code: String,
        /// Human readable message from the backend.
        message: String,
    },

    /// A resource identifier did not have the expected path shape.
    #[error("malformed resource ID: {0:?}")]
    MalformedResourceId(String),

    /// A parent reference is missing its name or identifier.
    #[error("incomplete server reference: {0}")]
    IncompleteReference(&'static str),

    /// No token could be obtained.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The query context was cancelled while a request was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// Network or TLS failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ArmError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ArmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// ARM error code of an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            ArmError::Api { code, .. } if !code.is_empty() => Some(code),
            _ => None,
        }
    }

    /// Find an `ArmError` anywhere in an anyhow error chain.
    pub fn from_anyhow(error: &anyhow::Error) -> Option<&ArmError> {
        error.chain().find_map(|e| e.downcast_ref::<ArmError>())
    }

    /// Build an API error from a status and a raw response body.
    ///
    /// ARM bodies look like `{"error": {"code": "...", "message": "..."}}`;
    /// some older endpoints drop the `error` wrapper.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: Option<Detail>,
            code: Option<String>,
            message: Option<String>,
        }

        #[derive(Deserialize)]
        struct Detail {
            code: Option<String>,
            message: Option<String>,
        }

        let (code, message) = match serde_json::from_str::<Envelope>(body) {
            Ok(Envelope {
                error: Some(detail),
                ..
            }) => (detail.code, detail.message),
            Ok(envelope) => (envelope.code, envelope.message),
            Err(_) => (None, None),
        };

        ArmError::Api {
            status,
            code: code.unwrap_or_default(),
            message: message.unwrap_or_else(|| "no error message in response".to_string()),
        }
    }
}

/// Decides which backend errors mean "the row does not exist".
///
/// Entries are matched against the ARM error code, and against the HTTP
/// status rendered as a string, so `"404"` catches any not-found status.
#[derive(Debug, Clone)]
pub struct IgnoreConfig {
    codes: Vec<String>,
}

impl IgnoreConfig {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// The set used by the server point lookup.
    pub fn not_found() -> Self {
        Self::new([
            "ResourceNotFound",
            "ResourceGroupNotFound",
            "404",
            "InvalidApiVersionParameter",
        ])
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Whether `error` should be swallowed and treated as "no result".
    pub fn should_ignore(&self, error: &anyhow::Error) -> bool {
        let Some(ArmError::Api { status, code, .. }) = ArmError::from_anyhow(error) else {
            return false;
        };
        let status = status.to_string();
        self.codes.iter().any(|c| *c == status || (!code.is_empty() && c == code))
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self::not_found()
    }
}
