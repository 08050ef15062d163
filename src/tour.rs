//! BigQuery API tour
//!
//! Walks through the resource lifecycle in a fixed order: find the project,
//! create a dataset and a table, load three rows, count them with a query,
//! read them back, delete everything, and confirm the dataset is gone.
//! Each step waits for the previous one.

use crate::bigquery::types::{
    DatasetReference, JobConfigurationLoad, JobReference, JobState, QueryRequest, TableFieldSchema,
    TableReference, TableSchema,
};
use crate::bigquery::{datasets, jobs, tabledata, tables, BigQueryClient};
use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::gcp::projects;
use serde::Serialize;
use std::io::Write;

pub const DATASET_FRIENDLY_NAME: &str = "Tour dataset";
pub const TABLE_FRIENDLY_NAME: &str = "Friendly Table";
/// Loaded as three one-column CSV rows
pub const LOAD_DATA: &[u8] = b"first\nsecond\nthird";
pub const LOAD_MEDIA_TYPE: &str = "application/octet-stream";

/// Identifiers shared by everything one run creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourIds {
    pub suffix: String,
    pub dataset_id: String,
    pub table_id: String,
    pub job_id: String,
}

impl TourIds {
    /// Fresh ids: unix seconds plus a random component, so parallel runs do not collide
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self::from_parts(chrono::Utc::now().timestamp(), &random[..8])
    }

    pub fn from_parts(timestamp: i64, random: &str) -> Self {
        let suffix = format!("tour_{}_{}", timestamp, random.to_ascii_lowercase());
        Self {
            dataset_id: format!("dataset_{suffix}"),
            table_id: format!("table_{suffix}"),
            job_id: format!("job_{suffix}"),
            suffix,
        }
    }
}

/// What a finished tour observed
#[derive(Debug, Clone)]
pub struct TourReport {
    pub project_friendly_name: Option<String>,
    pub dataset: DatasetReference,
    pub table: TableReference,
    pub job: JobReference,
    pub job_state: JobState,
    pub schema: TableSchema,
    pub row_count: Option<i64>,
    pub table_rows: usize,
    /// The not-found error returned when re-reading the deleted dataset
    pub deleted_dataset_error: String,
}

/// One run of the tour
pub struct Tour<'a, W: Write> {
    client: &'a BigQueryClient,
    project_id: String,
    ids: TourIds,
    poll: PollConfig,
    out: W,
    dataset_created: bool,
    table_created: bool,
}

impl<'a, W: Write> Tour<'a, W> {
    pub fn new(client: &'a BigQueryClient, project_id: &str, poll: PollConfig, out: W) -> Self {
        Self::with_ids(client, project_id, TourIds::generate(), poll, out)
    }

    pub fn with_ids(
        client: &'a BigQueryClient,
        project_id: &str,
        ids: TourIds,
        poll: PollConfig,
        out: W,
    ) -> Self {
        Self {
            client,
            project_id: project_id.to_string(),
            ids,
            poll,
            out,
            dataset_created: false,
            table_created: false,
        }
    }

    pub fn ids(&self) -> &TourIds {
        &self.ids
    }

    fn dataset_ref(&self) -> DatasetReference {
        DatasetReference {
            dataset_id: self.ids.dataset_id.clone(),
            project_id: self.project_id.clone(),
        }
    }

    fn table_ref(&self) -> TableReference {
        TableReference {
            project_id: self.project_id.clone(),
            dataset_id: self.ids.dataset_id.clone(),
            table_id: self.ids.table_id.clone(),
        }
    }

    fn job_ref(&self) -> JobReference {
        JobReference {
            project_id: self.project_id.clone(),
            job_id: self.ids.job_id.clone(),
            location: None,
        }
    }

    fn print_json<T: Serialize>(&mut self, label: &str, value: &T) -> Result<()> {
        writeln!(self.out, "{label}:\n{}", serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    /// Run every step. Resources left behind by a failure are logged, not deleted.
    pub async fn run(mut self) -> Result<TourReport> {
        tracing::info!("Starting tour in {} with suffix {}", self.project_id, self.ids.suffix);
        writeln!(self.out, "Running BigQuery API tour")?;

        let result = self.steps().await;

        if let Err(err) = &result {
            if self.table_created {
                tracing::warn!("Tour failed ({}); table {} was left behind", err, self.ids.table_id);
            }
            if self.dataset_created {
                tracing::warn!(
                    "Tour failed ({}); dataset {} was left behind",
                    err,
                    self.ids.dataset_id
                );
            }
        }

        result
    }

    async fn steps(&mut self) -> Result<TourReport> {
        let project_friendly_name = self.find_project().await?;
        self.create_dataset().await?;
        let schema = self.create_table().await?;
        let job_state = self.load_rows().await?;
        let row_count = self.count_rows().await?;
        let table_rows = self.read_table().await?;
        self.cleanup().await?;
        let deleted_dataset_error = self.confirm_deleted().await?;

        Ok(TourReport {
            project_friendly_name,
            dataset: self.dataset_ref(),
            table: self.table_ref(),
            job: self.job_ref(),
            job_state,
            schema,
            row_count,
            table_rows,
            deleted_dataset_error,
        })
    }

    /// Step 1: find the project and print its friendly name
    async fn find_project(&mut self) -> Result<Option<String>> {
        let project = projects::find_project(self.client, &self.project_id).await?;
        match &project {
            Some(p) => writeln!(self.out, "Found {}: {}", p.project_id, p.friendly_name)?,
            None => tracing::info!("Project {} not in the project list", self.project_id),
        }
        Ok(project.map(|p| p.friendly_name))
    }

    /// Steps 2 and 3: create and rename the dataset, then find it in the listing
    async fn create_dataset(&mut self) -> Result<()> {
        let dataset_ref = self.dataset_ref();

        datasets::insert(self.client, &dataset_ref).await?;
        self.dataset_created = true;

        let dataset =
            datasets::set_friendly_name(self.client, &dataset_ref, DATASET_FRIENDLY_NAME).await?;
        self.print_json("Dataset", &dataset)?;

        let listed = datasets::list(self.client, &self.project_id).await?;
        let entry = listed
            .iter()
            .find(|d| d.dataset_reference == dataset_ref)
            .ok_or_else(|| Error::NotListed {
                kind: "dataset",
                id: dataset_ref.dataset_id.clone(),
            })?;

        let id = entry.id.as_deref().or(dataset.id.as_deref()).unwrap_or(&dataset_ref.dataset_id);
        writeln!(self.out, "Found {id}")?;
        Ok(())
    }

    /// Steps 4 and 5: create the table, attach the schema, rename it, then find it in the listing
    async fn create_table(&mut self) -> Result<TableSchema> {
        let table_ref = self.table_ref();

        let table = tables::insert(self.client, &table_ref).await?;
        self.table_created = true;

        let schema = TableSchema {
            fields: vec![TableFieldSchema::new("a", "STRING")],
        };
        let table = tables::set_schema(self.client, table, &table_ref, schema).await?;
        let schema = table.schema.clone().unwrap_or_default();

        let table = tables::set_friendly_name(self.client, &table_ref, TABLE_FRIENDLY_NAME).await?;
        self.print_json("Table", &table)?;

        let listed = tables::list(self.client, &self.project_id, &self.ids.dataset_id).await?;
        let entry = listed
            .iter()
            .find(|t| t.table_reference == table_ref)
            .ok_or_else(|| Error::NotListed {
                kind: "table",
                id: table_ref.table_id.clone(),
            })?;

        let id = entry.id.as_deref().or(table.id.as_deref()).unwrap_or(&table_ref.table_id);
        writeln!(self.out, "Found {id}")?;
        Ok(schema)
    }

    /// Steps 6 and 7: upload three rows as a load job, list active jobs, wait for DONE
    async fn load_rows(&mut self) -> Result<JobState> {
        let load = JobConfigurationLoad {
            destination_table: self.table_ref(),
            schema: None,
            source_format: Some("CSV".to_string()),
            write_disposition: None,
        };

        let job = jobs::insert_load(self.client, &self.job_ref(), load, LOAD_DATA, LOAD_MEDIA_TYPE)
            .await?;

        let active = jobs::list(self.client, &self.project_id, &["pending", "running"]).await?;
        self.print_json("Pending and running jobs", &active)?;

        let job = jobs::wait_for_job(self.client, job, &self.poll).await?;
        let state = job.status.as_ref().map(|s| s.state).unwrap_or(JobState::Done);
        writeln!(self.out, "Job {} is {}", self.ids.job_id, state.as_str())?;
        Ok(state)
    }

    /// Step 8: count the rows with a query and wait for the result
    async fn count_rows(&mut self) -> Result<Option<i64>> {
        let request = QueryRequest {
            query: format!("SELECT COUNT(*) FROM `{}`", self.table_ref().sql_path()),
            timeout_ms: 0,
            max_results: 1,
            use_legacy_sql: false,
        };

        let results = jobs::query(self.client, &self.project_id, &request).await?;
        let results = jobs::wait_for_query(self.client, results, &self.poll).await?;
        self.print_json("Query results", &results)?;

        Ok(results.scalar_i64())
    }

    /// Step 9: read the rows and the table metadata
    async fn read_table(&mut self) -> Result<usize> {
        let table_ref = self.table_ref();
        let data = tabledata::list(self.client, &table_ref, None).await?;
        let table = tables::get(self.client, &table_ref).await?;

        self.print_json("Table data", &data)?;
        self.print_json("Table", &table)?;
        Ok(data.rows.len())
    }

    /// Step 10: delete the table, then the dataset
    async fn cleanup(&mut self) -> Result<()> {
        tables::delete(self.client, &self.table_ref()).await?;
        self.table_created = false;

        datasets::delete(self.client, &self.dataset_ref()).await?;
        self.dataset_created = false;
        Ok(())
    }

    /// Step 11: reading the deleted dataset must fail with not-found
    async fn confirm_deleted(&mut self) -> Result<String> {
        match datasets::get(self.client, &self.dataset_ref()).await {
            Ok(_) => Err(Error::DeletedDatasetStillPresent(self.ids.dataset_id.clone())),
            Err(err) if err.is_not_found() => {
                writeln!(self.out, "Expected error:\n{err}")?;
                Ok(err.to_string())
            }
            Err(err) => Err(err),
        }
    }
}

/// Run the tour against `project_id`, printing to stdout
pub async fn run_tour(
    client: &BigQueryClient,
    project_id: &str,
    poll: PollConfig,
) -> Result<TourReport> {
    Tour::new(client, project_id, poll, std::io::stdout().lock()).run().await
}
