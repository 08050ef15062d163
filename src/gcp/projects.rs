//! GCP Projects
//!
//! Projects visible to the BigQuery API.

use crate::bigquery::types::ProjectListEntry;
use crate::bigquery::BigQueryClient;
use crate::error::Result;

/// Project information
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub project_id: String,
    pub friendly_name: String,
    pub numeric_id: String,
}

impl From<ProjectListEntry> for Project {
    fn from(entry: ProjectListEntry) -> Self {
        Self {
            project_id: entry.project_reference.project_id,
            friendly_name: entry.friendly_name.unwrap_or_else(|| "-".to_string()),
            numeric_id: entry.numeric_id.unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// List all projects the caller can see in BigQuery
pub async fn list_projects(client: &BigQueryClient) -> Result<Vec<Project>> {
    let url = client.api_url(&["projects"]);
    let entries: Vec<ProjectListEntry> = client.list_all(&url, &[]).await?;
    Ok(entries.into_iter().map(Project::from).collect())
}

/// Look up one project by id
pub async fn find_project(client: &BigQueryClient, project_id: &str) -> Result<Option<Project>> {
    let projects = list_projects(client).await?;
    Ok(projects.into_iter().find(|p| p.project_id == project_id))
}
