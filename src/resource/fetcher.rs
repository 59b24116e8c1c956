//! Resource Fetcher
//!
//! Pages through ARM list calls. ARM list responses carry the items in
//! `value` and an absolute `nextLink` URL while more pages remain.

use crate::azure::client::ArmClient;
use crate::query::QueryContext;
use crate::sql::models::Page;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Pull-based pager over one ARM list call
///
/// Holds no state beyond the next URL to fetch. A failed page ends paging:
/// afterwards [`Pager::more`] returns false.
pub struct Pager<T> {
    client: ArmClient,
    ctx: QueryContext,
    next_url: Option<String>,
    pages_fetched: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Pager<T> {
    pub fn new(client: ArmClient, url: String, ctx: QueryContext) -> Self {
        Self {
            client,
            ctx,
            next_url: Some(url),
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    /// Whether another page can be requested
    pub fn more(&self) -> bool {
        self.next_url.is_some()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page. Returns an empty page once paging is complete.
    pub async fn next_page(&mut self) -> Result<Vec<T>> {
        let Some(url) = self.next_url.take() else {
            return Ok(Vec::new());
        };

        let response = self.client.get(&url, &self.ctx).await?;
        self.pages_fetched += 1;

        // 204 / empty body: nothing to list
        if response.body.is_null() {
            return Ok(Vec::new());
        }

        let page: Page<T> = parse_page(response.body)?;

        if let Some(link) = page.next_link.filter(|l| !l.is_empty()) {
            self.next_url = Some(self.client.resolve_link(&link)?);
        }

        tracing::trace!(
            "Fetched page {} with {} items (more: {})",
            self.pages_fetched,
            page.value.len(),
            self.more()
        );

        Ok(page.value)
    }

    /// Fetch all remaining pages (auto-paginate)
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut all_items = Vec::new();

        while self.more() {
            let items = self.next_page().await?;
            all_items.extend(items);
        }

        Ok(all_items)
    }
}

fn parse_page<T: DeserializeOwned>(body: Value) -> Result<Page<T>> {
    serde_json::from_value(body)
        .map_err(crate::azure::error::ArmError::from)
        .context("Failed to parse list page")
}

/// Extract a value from JSON using a dot-notation path
/// e.g., "properties.state" or "tags.env"; numeric segments index arrays
pub fn extract_json_value<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;

    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    Some(current)
}
