//! Query context
//!
//! Per-query state handed down from the consumer: a cancellation signal, an
//! optional row limit and the equality qualifiers used by point lookups.

use std::collections::HashMap;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::azure::error::ArmError;

/// Cancellation and row limit for one query.
///
/// Cloning is cheap and clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancel: CancellationToken,
    limit: Option<usize>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after `limit` rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the query is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ArmError::Cancelled.into());
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ArmError::Cancelled.into()),
            result = fut => result,
        }
    }
}

/// Equality qualifiers (`column = 'value'`) for key-column lookups.
#[derive(Debug, Clone, Default)]
pub struct KeyQuals {
    values: HashMap<String, String>,
}

impl KeyQuals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.values.insert(column.to_string(), value.to_string());
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Value of a required key column; missing or empty is an error.
    pub fn require(&self, column: &str) -> anyhow::Result<&str> {
        match self.get(column) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(anyhow::anyhow!("Missing required key column: {}", column)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_future_output() {
        let ctx = QueryContext::new();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_after_cancel_is_cancelled() {
        let ctx = QueryContext::new();
        ctx.cancel();
        let err = ctx.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(
            ArmError::from_anyhow(&err),
            Some(ArmError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_future() {
        let ctx = QueryContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = ctx
            .run(futures::future::pending::<anyhow::Result<()>>())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_key_quals_require() {
        let quals = KeyQuals::new().with("name", "srv1").with("resource_group", "");
        assert_eq!(quals.require("name").unwrap(), "srv1");
        assert!(quals.require("resource_group").is_err());
        assert!(quals.require("missing").is_err());
    }
}
