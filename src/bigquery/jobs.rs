//! Job resource: load jobs, queries, and polling

use super::poll::Backoff;
use super::types::{
    Job, JobConfiguration, JobConfigurationLoad, JobListEntry, JobReference,
    QueryRequest, QueryResponse,
};
use super::BigQueryClient;
use crate::config::PollConfig;
use crate::error::{Error, Result};
use serde_json::json;

/// Server-side long-poll used while waiting on query results
pub const RESULTS_TIMEOUT_MS: u32 = 10_000;
/// Page size for `getQueryResults`
pub const RESULTS_MAX_RESULTS: u32 = 10;

fn location_query(job: &JobReference) -> Vec<(&'static str, String)> {
    job.location
        .iter()
        .map(|loc| ("location", loc.clone()))
        .collect()
}

/// Start a load job whose data is uploaded inline with the request
pub async fn insert_load(
    client: &BigQueryClient,
    job_ref: &JobReference,
    load: JobConfigurationLoad,
    media: &[u8],
    media_type: &str,
) -> Result<Job> {
    let url = client.upload_url(&["projects", &job_ref.project_id, "jobs"]);
    let configuration = JobConfiguration {
        load: Some(load),
        query: None,
    };
    let metadata = json!({
        "jobReference": job_ref,
        "configuration": configuration,
    });

    let job: Job = client.http.upload(&url, &metadata, media, media_type).await?;
    tracing::info!(
        "Submitted load job {} ({})",
        job_ref.job_id,
        job.status.as_ref().map(|s| s.state.as_str()).unwrap_or("?")
    );
    Ok(job)
}

/// List jobs in a project, filtered by state (`pending`, `running`, `done`)
pub async fn list(
    client: &BigQueryClient,
    project_id: &str,
    state_filter: &[&str],
) -> Result<Vec<JobListEntry>> {
    let url = client.api_url(&["projects", project_id, "jobs"]);
    let query: Vec<(&str, String)> = state_filter
        .iter()
        .map(|s| ("stateFilter", s.to_string()))
        .collect();
    client.list_all(&url, &query).await
}

pub async fn get(client: &BigQueryClient, job_ref: &JobReference) -> Result<Job> {
    let url = client.api_url(&["projects", &job_ref.project_id, "jobs", &job_ref.job_id]);
    client.http.get(&url, &location_query(job_ref)).await
}

/// Re-fetch `job` until it is DONE.
///
/// Waits with exponential backoff between fetches and gives up at the
/// configured timeout. A DONE job that carries an `errorResult` is returned
/// as [`Error::JobFailed`].
pub async fn wait_for_job(client: &BigQueryClient, mut job: Job, poll: &PollConfig) -> Result<Job> {
    let job_ref = job
        .job_reference
        .clone()
        .ok_or_else(|| Error::Config("job has no jobReference to poll".into()))?;
    let what = format!("job {}", job_ref.job_id);
    let mut backoff = Backoff::new(poll);

    loop {
        tracing::debug!(
            "Job {} state: {:?}",
            job_ref.job_id,
            job.status.as_ref().map(|s| s.state)
        );

        if job.status.as_ref().is_some_and(|s| s.is_done()) {
            break;
        }

        backoff.wait(&what).await?;
        job = get(client, &job_ref).await?;
    }

    if let Some(err) = job.status.as_ref().and_then(|s| s.failure()) {
        return Err(Error::JobFailed {
            job_id: job_ref.job_id,
            reason: err.reason.clone(),
            message: err.message.clone().unwrap_or_default(),
        });
    }

    tracing::info!(
        "Job {} done after {} polls in {:?}",
        job_ref.job_id,
        backoff.poll_count,
        backoff.elapsed()
    );
    Ok(job)
}

/// Run a query synchronously; the response may come back incomplete
pub async fn query(
    client: &BigQueryClient,
    project_id: &str,
    request: &QueryRequest,
) -> Result<QueryResponse> {
    let url = client.api_url(&["projects", project_id, "queries"]);
    client.http.post(&url, Some(request)).await
}

pub async fn get_query_results(
    client: &BigQueryClient,
    job_ref: &JobReference,
    timeout_ms: u32,
    max_results: u32,
) -> Result<QueryResponse> {
    let url = client.api_url(&[
        "projects",
        &job_ref.project_id,
        "queries",
        &job_ref.job_id,
    ]);
    let mut params = vec![
        ("timeoutMs", timeout_ms.to_string()),
        ("maxResults", max_results.to_string()),
    ];
    params.extend(location_query(job_ref));
    client.http.get(&url, &params).await
}

/// Call `getQueryResults` until `jobComplete`.
///
/// Each call long-polls on the server for up to [`RESULTS_TIMEOUT_MS`], so
/// no client-side sleep is added. The loop still stops at the configured
/// timeout.
pub async fn wait_for_query(
    client: &BigQueryClient,
    mut results: QueryResponse,
    poll: &PollConfig,
) -> Result<QueryResponse> {
    let what = format!("query {}", results.job_reference.job_id);
    let mut backoff = Backoff::new(poll);

    while !results.job_complete {
        backoff.check_deadline(&what)?;
        let job_ref = results.job_reference.clone();
        results =
            get_query_results(client, &job_ref, RESULTS_TIMEOUT_MS, RESULTS_MAX_RESULTS).await?;
    }

    tracing::info!(
        "Query {} complete after {} polls",
        results.job_reference.job_id,
        backoff.poll_count
    );
    Ok(results)
}
