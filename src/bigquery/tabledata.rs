//! Table data resource

use super::types::{TableDataList, TableReference};
use super::BigQueryClient;
use crate::error::Result;

/// Read rows straight from table storage, one page
pub async fn list(
    client: &BigQueryClient,
    table: &TableReference,
    max_results: Option<u32>,
) -> Result<TableDataList> {
    let url = client.api_url(&[
        "projects",
        &table.project_id,
        "datasets",
        &table.dataset_id,
        "tables",
        &table.table_id,
        "data",
    ]);

    let query: Vec<(&str, String)> = max_results
        .map(|n| vec![("maxResults", n.to_string())])
        .unwrap_or_default();

    client.http.get(&url, &query).await
}
