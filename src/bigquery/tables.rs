//! Table resource

use super::types::{Table, TableListEntry, TableReference, TableSchema};
use super::BigQueryClient;
use crate::error::Result;
use serde_json::json;

fn table_url(client: &BigQueryClient, table: &TableReference) -> String {
    client.api_url(&[
        "projects",
        &table.project_id,
        "datasets",
        &table.dataset_id,
        "tables",
        &table.table_id,
    ])
}

/// Create a table with no schema
pub async fn insert(client: &BigQueryClient, table: &TableReference) -> Result<Table> {
    let url = client.api_url(&[
        "projects",
        &table.project_id,
        "datasets",
        &table.dataset_id,
        "tables",
    ]);
    let body = json!({ "tableReference": table });
    let created: Table = client.http.post(&url, Some(&body)).await?;
    tracing::info!("Created table {}", table.table_id);
    Ok(created)
}

/// Full replace of the table resource
pub async fn update(client: &BigQueryClient, table: &TableReference, body: &Table) -> Result<Table> {
    client.http.put(&table_url(client, table), body).await
}

/// Replace the schema, keeping the rest of `current`
pub async fn set_schema(
    client: &BigQueryClient,
    current: Table,
    table: &TableReference,
    schema: TableSchema,
) -> Result<Table> {
    let body = Table {
        schema: Some(schema),
        ..current
    };
    update(client, table, &body).await
}

/// Partial update. Only the fields present in `patch` change.
pub async fn patch(
    client: &BigQueryClient,
    table: &TableReference,
    patch: &serde_json::Value,
) -> Result<Table> {
    client.http.patch(&table_url(client, table), patch).await
}

pub async fn set_friendly_name(
    client: &BigQueryClient,
    table: &TableReference,
    name: &str,
) -> Result<Table> {
    patch(client, table, &json!({ "friendlyName": name })).await
}

pub async fn get(client: &BigQueryClient, table: &TableReference) -> Result<Table> {
    client.http.get(&table_url(client, table), &[]).await
}

/// List all tables in a dataset
pub async fn list(
    client: &BigQueryClient,
    project_id: &str,
    dataset_id: &str,
) -> Result<Vec<TableListEntry>> {
    let url = client.api_url(&["projects", project_id, "datasets", dataset_id, "tables"]);
    client.list_all(&url, &[]).await
}

pub async fn delete(client: &BigQueryClient, table: &TableReference) -> Result<()> {
    client.http.delete(&table_url(client, table)).await?;
    tracing::info!("Deleted table {}", table.table_id);
    Ok(())
}
