//! SQL Servers
//!
//! The list and get operations of the `azure_sql_server` table.

use super::models::{Server, ServerGetResponse};
use crate::azure::client::ArmClient;
use crate::azure::error::IgnoreConfig;
use crate::query::{KeyQuals, QueryContext};
use crate::resource::Pager;
use anyhow::{Context, Result};
use futures::Stream;
use std::collections::VecDeque;

/// Lists and looks up SQL servers in one subscription
#[derive(Clone)]
pub struct ServersClient {
    client: ArmClient,
    ignore: IgnoreConfig,
}

impl ServersClient {
    pub fn new(client: ArmClient) -> Self {
        Self {
            client,
            ignore: IgnoreConfig::not_found(),
        }
    }

    /// Replace the set of errors the point lookup treats as "no row"
    pub fn with_ignore_config(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = ignore;
        self
    }

    /// Lazily list every server in the subscription.
    ///
    /// Nothing is requested until the first [`ServerLister::next`] call.
    pub fn list(&self, ctx: &QueryContext) -> ServerLister {
        let pager = Pager::new(self.client.clone(), self.client.sql_servers_url(), ctx.clone());
        ServerLister {
            pager,
            buffered: VecDeque::new(),
            remaining: ctx.limit(),
        }
    }

    /// Look up a single server.
    ///
    /// Returns `Ok(None)` when the backend reports a not-found class error,
    /// or when it answers successfully with an empty `id`.
    pub async fn get(
        &self,
        resource_group: &str,
        name: &str,
        ctx: &QueryContext,
    ) -> Result<Option<ServerGetResponse>> {
        if name.is_empty() || resource_group.is_empty() {
            return Err(anyhow::anyhow!(
                "Server name and resource group must not be empty"
            ));
        }

        tracing::trace!("get SQL server {}/{}", resource_group, name);

        let url = self.client.sql_server_url(resource_group, name);
        let response = match self.client.get(&url, ctx).await {
            Ok(response) => response,
            Err(e) if self.ignore.should_ignore(&e) => {
                tracing::debug!("SQL server {}/{} not found: {}", resource_group, name, e);
                return Ok(None);
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Failed to get SQL server {}/{}",
                    resource_group, name
                )))
            }
        };

        if response.body.is_null() {
            return Ok(None);
        }

        let server: Server = serde_json::from_value(response.body)
            .context("Failed to parse SQL server response")?;

        // Compatibility shim: some lookups of missing servers succeed with
        // an empty payload instead of failing with ResourceNotFound.
        if server.id.as_deref().map_or(true, str::is_empty) {
            tracing::debug!(
                "SQL server {}/{} returned no id, treating as not found",
                resource_group,
                name
            );
            return Ok(None);
        }

        Ok(Some(ServerGetResponse {
            server,
            request_id: response.request_id,
        }))
    }

    /// Point lookup driven by the `name` and `resource_group` key columns
    pub async fn get_by_quals(
        &self,
        quals: &KeyQuals,
        ctx: &QueryContext,
    ) -> Result<Option<ServerGetResponse>> {
        let name = quals.require("name")?;
        let resource_group = quals.require("resource_group")?;
        self.get(resource_group, name, ctx).await
    }
}

/// Pull-based iterator over the servers of a subscription
///
/// Pages are fetched on demand. With a row limit, the lister stops after
/// exactly that many servers and requests no further pages. The first
/// error ends the listing; servers already returned stay valid.
pub struct ServerLister {
    pager: Pager<Server>,
    buffered: VecDeque<Server>,
    remaining: Option<usize>,
}

impl ServerLister {
    /// Next server, or `None` when the listing is exhausted or the limit is hit
    pub async fn next(&mut self) -> Result<Option<Server>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }

        loop {
            if let Some(server) = self.buffered.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Ok(Some(server));
            }

            if !self.pager.more() {
                return Ok(None);
            }

            let page = self
                .pager
                .next_page()
                .await
                .context("Failed to list SQL servers")?;
            self.buffered.extend(page);
        }
    }

    /// Number of list pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pager.pages_fetched()
    }

    /// Drain the lister into a vector
    pub async fn collect_all(mut self) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        while let Some(server) = self.next().await? {
            servers.push(server);
        }
        Ok(servers)
    }

    /// Adapt the lister into a stream; dropping the stream stops paging
    pub fn into_stream(self) -> impl Stream<Item = Result<Server>> {
        futures::stream::try_unfold(self, |mut lister| async move {
            let next = lister.next().await?;
            Ok::<_, anyhow::Error>(next.map(|server| (server, lister)))
        })
    }
}
