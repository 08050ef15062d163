//! Dataset resource

use super::types::{Dataset, DatasetListEntry, DatasetReference};
use super::BigQueryClient;
use crate::error::Result;
use serde_json::json;

fn dataset_url(client: &BigQueryClient, dataset: &DatasetReference) -> String {
    client.api_url(&[
        "projects",
        &dataset.project_id,
        "datasets",
        &dataset.dataset_id,
    ])
}

/// Create an empty dataset
pub async fn insert(client: &BigQueryClient, dataset: &DatasetReference) -> Result<Dataset> {
    let url = client.api_url(&["projects", &dataset.project_id, "datasets"]);
    let body = json!({ "datasetReference": dataset });
    let created: Dataset = client.http.post(&url, Some(&body)).await?;
    tracing::info!("Created dataset {}", dataset.dataset_id);
    Ok(created)
}

/// Partial update. Only the fields present in `patch` change.
pub async fn patch(
    client: &BigQueryClient,
    dataset: &DatasetReference,
    patch: &serde_json::Value,
) -> Result<Dataset> {
    client.http.patch(&dataset_url(client, dataset), patch).await
}

/// Set the friendly name
pub async fn set_friendly_name(
    client: &BigQueryClient,
    dataset: &DatasetReference,
    name: &str,
) -> Result<Dataset> {
    patch(client, dataset, &json!({ "friendlyName": name })).await
}

pub async fn get(client: &BigQueryClient, dataset: &DatasetReference) -> Result<Dataset> {
    client.http.get(&dataset_url(client, dataset), &[]).await
}

/// List all datasets in a project
pub async fn list(client: &BigQueryClient, project_id: &str) -> Result<Vec<DatasetListEntry>> {
    let url = client.api_url(&["projects", project_id, "datasets"]);
    client.list_all(&url, &[]).await
}

/// Delete an empty dataset
pub async fn delete(client: &BigQueryClient, dataset: &DatasetReference) -> Result<()> {
    client.http.delete(&dataset_url(client, dataset)).await?;
    tracing::info!("Deleted dataset {}", dataset.dataset_id);
    Ok(())
}
