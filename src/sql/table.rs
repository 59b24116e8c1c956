//! The `azure_sql_server` table
//!
//! Glues the lister, the getter and the enrichers to the table schema:
//! every row runs only the enrichers its projected columns need, all of
//! them concurrently.

use super::models::{Server, ServerRef};
use super::sub_resources::SqlClients;
use crate::azure::error::ArmError;
use crate::query::{KeyQuals, QueryContext};
use crate::resource::{build_row, get_table, ColumnDef, Hydrated, Row, RowContext, TableDef};
use anyhow::{Context, Result};
use futures::{Stream, StreamExt, TryStreamExt};

pub const TABLE_NAME: &str = "azure_sql_server";

/// Default number of rows hydrated at the same time
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Schema and clients for `azure_sql_server`
#[derive(Clone)]
pub struct SqlServerTable {
    clients: SqlClients,
    table: &'static TableDef,
}

impl SqlServerTable {
    pub fn new(clients: SqlClients) -> Result<Self> {
        let table = get_table(TABLE_NAME)
            .with_context(|| format!("Table definition missing: {}", TABLE_NAME))?;
        let clients = clients.with_ignore_config(table.ignore_config());
        Ok(Self { clients, table })
    }

    pub fn definition(&self) -> &'static TableDef {
        self.table
    }

    pub fn clients(&self) -> &SqlClients {
        &self.clients
    }

    /// Build the row for one server, running the enrichers `columns` need
    pub async fn row_for<S: ServerRef + serde::Serialize>(
        &self,
        server: &S,
        columns: &[&ColumnDef],
        ctx: &QueryContext,
    ) -> Result<Row> {
        let kinds = TableDef::hydrate_kinds(columns);

        let results = futures::future::join_all(kinds.iter().map(|&kind| async move {
            (kind, self.clients.hydrate(kind, server, ctx).await)
        }))
        .await;
        let hydrated: Hydrated = results.into_iter().collect();

        // A cancelled query yields no row, never one with nulled columns
        let cancelled = hydrated.values().any(|result| {
            matches!(
                result.as_ref().err().and_then(ArmError::from_anyhow),
                Some(ArmError::Cancelled)
            )
        });
        if cancelled || ctx.is_cancelled() {
            return Err(ArmError::Cancelled.into());
        }

        let item = serde_json::to_value(server).context("Failed to serialize server")?;
        let arm = self.clients.arm();
        let row_ctx = RowContext {
            subscription_id: &arm.subscription_id,
            cloud_environment: arm.cloud_environment(),
        };

        Ok(build_row(columns, &item, &hydrated, row_ctx))
    }

    /// Stream rows for every server, in listing order.
    ///
    /// Up to `concurrency` rows are hydrated at once. The row limit in `ctx`
    /// bounds how many servers are listed.
    pub fn list_rows<'a>(
        &'a self,
        columns: &'a [&'a ColumnDef],
        ctx: &'a QueryContext,
        concurrency: usize,
    ) -> impl Stream<Item = Result<Row>> + 'a {
        self.clients
            .servers()
            .list(ctx)
            .into_stream()
            .map_ok(move |server: Server| async move { self.row_for(&server, columns, ctx).await })
            .try_buffered(concurrency.max(1))
    }

    /// Row for the server addressed by the key columns, if it exists
    pub async fn get_row(
        &self,
        quals: &KeyQuals,
        columns: &[&ColumnDef],
        ctx: &QueryContext,
    ) -> Result<Option<Row>> {
        let Some(response) = self.clients.servers().get_by_quals(quals, ctx).await? else {
            return Ok(None);
        };

        // The get response is a valid parent for every enricher
        let row = self.row_for(&response, columns, ctx).await?;
        Ok(Some(row))
    }
}
