//! Integration tests for the BigQuery HTTP layer using wiremock
//!
//! These tests verify the authorized client and resource wrappers against
//! mocked endpoints: bearer tokens, error envelopes, pagination, and uploads.

use bqtour::bigquery::types::{
    DatasetReference, JobConfigurationLoad, JobReference, TableFieldSchema, TableReference,
    TableSchema,
};
use bqtour::bigquery::{datasets, jobs, tables, BigQueryClient};
use bqtour::gcp::auth::Credentials;
use bqtour::gcp::http::GcpHttpClient;
use bqtour::Error;
use serde_json::json;
use wiremock::matchers::{
    bearer_token, body_partial_json, body_string_contains, header_regex, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> BigQueryClient {
    let http = Credentials::from_static_token("test-token").authorize(GcpHttpClient::new().unwrap());
    BigQueryClient::new(http, server.uri())
}

fn dataset_ref() -> DatasetReference {
    DatasetReference {
        dataset_id: "tour_ds".into(),
        project_id: "test-project".into(),
    }
}

/// Test module for HTTP client integration tests
mod http_client_tests {
    use super::*;

    /// Test successful GET request returns parsed resource
    #[tokio::test]
    async fn test_get_dataset_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets/tour_ds"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "bigquery#dataset",
                "id": "test-project:tour_ds",
                "datasetReference": {"projectId": "test-project", "datasetId": "tour_ds"},
                "location": "US"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dataset = datasets::get(&client_for(&server), &dataset_ref())
            .await
            .expect("Request should succeed");

        assert_eq!(dataset.id.as_deref(), Some("test-project:tour_ds"));
        assert_eq!(dataset.location.as_deref(), Some("US"));
        assert_eq!(dataset.extra["kind"], "bigquery#dataset");
    }

    /// Test 404 response maps to a not-found API error
    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets/tour_ds"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "Not found: Dataset test-project:tour_ds",
                    "errors": [{"reason": "notFound", "message": "Not found: Dataset test-project:tour_ds"}],
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        let err = datasets::get(&client_for(&server), &dataset_ref())
            .await
            .expect_err("Request should fail");

        assert!(err.is_not_found());
        assert!(err.to_string().contains("[notFound]"));
    }

    /// Test 403 response keeps status and message
    #[tokio::test]
    async fn test_403_returns_forbidden() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/test-project/datasets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Access Denied", "errors": [{"reason": "accessDenied"}]}
            })))
            .mount(&server)
            .await;

        let err = datasets::insert(&client_for(&server), &dataset_ref())
            .await
            .expect_err("Request should fail");

        match err {
            Error::Api {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(reason.as_deref(), Some("accessDenied"));
                assert_eq!(message, "Access Denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Test DELETE with an empty 204 body
    #[tokio::test]
    async fn test_delete_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/bigquery/v2/projects/test-project/datasets/tour_ds"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        tokio_test::assert_ok!(datasets::delete(&client_for(&server), &dataset_ref()).await);
    }

    /// Test PATCH sends only the friendly name
    #[tokio::test]
    async fn test_patch_friendly_name() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/bigquery/v2/projects/test-project/datasets/tour_ds"))
            .and(body_partial_json(json!({"friendlyName": "Tour dataset"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "test-project:tour_ds",
                "friendlyName": "Tour dataset"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dataset = datasets::set_friendly_name(&client_for(&server), &dataset_ref(), "Tour dataset")
            .await
            .unwrap();
        assert_eq!(dataset.friendly_name.as_deref(), Some("Tour dataset"));
    }

    /// Test PUT replaces the schema
    #[tokio::test]
    async fn test_update_table_schema() {
        let server = MockServer::start().await;
        let table_ref = TableReference {
            project_id: "test-project".into(),
            dataset_id: "tour_ds".into(),
            table_id: "tour_t".into(),
        };

        Mock::given(method("PUT"))
            .and(path("/bigquery/v2/projects/test-project/datasets/tour_ds/tables/tour_t"))
            .and(body_partial_json(json!({
                "tableReference": {"tableId": "tour_t"},
                "schema": {"fields": [{"name": "a", "type": "STRING"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "test-project:tour_ds.tour_t",
                "tableReference": {"projectId": "test-project", "datasetId": "tour_ds", "tableId": "tour_t"},
                "schema": {"fields": [{"name": "a", "type": "STRING", "mode": "NULLABLE"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let current = bqtour::bigquery::types::Table {
            table_reference: Some(table_ref.clone()),
            ..Default::default()
        };
        let schema = TableSchema {
            fields: vec![TableFieldSchema::new("a", "STRING")],
        };
        let table = tables::set_schema(&client_for(&server), current, &table_ref, schema)
            .await
            .unwrap();

        let fields = table.schema.unwrap().fields;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "a");
        assert_eq!(fields[0].field_type, "STRING");
    }

    /// Test pagination with nextPageToken
    #[tokio::test]
    async fn test_list_follows_next_page_token() {
        let server = MockServer::start().await;

        // Second page
        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets"))
            .and(query_param("pageToken", "token-page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "datasets": [
                    {"id": "test-project:ds3", "datasetReference": {"projectId": "test-project", "datasetId": "ds3"}}
                ]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        // First page
        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "datasets": [
                    {"id": "test-project:ds1", "datasetReference": {"projectId": "test-project", "datasetId": "ds1"}},
                    {"id": "test-project:ds2", "datasetReference": {"projectId": "test-project", "datasetId": "ds2"}}
                ],
                "nextPageToken": "token-page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listed = datasets::list(&client_for(&server), "test-project").await.unwrap();
        let ids: Vec<&str> = listed
            .iter()
            .map(|d| d.dataset_reference.dataset_id.as_str())
            .collect();
        assert_eq!(ids, vec!["ds1", "ds2", "ds3"]);
    }

    /// Test empty project has no `datasets` key at all
    #[tokio::test]
    async fn test_list_without_items() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "bigquery#datasetList",
                "etag": "abc"
            })))
            .mount(&server)
            .await;

        let listed = datasets::list(&client_for(&server), "test-project").await.unwrap();
        assert!(listed.is_empty());
    }

    /// Test multipart media upload for load jobs
    #[tokio::test]
    async fn test_load_job_multipart_upload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/bigquery/v2/projects/test-project/jobs"))
            .and(query_param("uploadType", "multipart"))
            .and(header_regex("content-type", "^multipart/related; boundary=bqtour_[0-9a-f]+$"))
            .and(body_string_contains("\"jobId\":\"job_1\""))
            .and(body_string_contains("Content-Type: application/octet-stream\r\n\r\nfirst\nsecond\nthird"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "test-project:US.job_1",
                "jobReference": {"projectId": "test-project", "jobId": "job_1", "location": "US"},
                "configuration": {"load": {"destinationTable": {"projectId": "test-project", "datasetId": "tour_ds", "tableId": "tour_t"}}},
                "status": {"state": "RUNNING"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let job_ref = JobReference {
            project_id: "test-project".into(),
            job_id: "job_1".into(),
            location: None,
        };
        let load = JobConfigurationLoad {
            destination_table: TableReference {
                project_id: "test-project".into(),
                dataset_id: "tour_ds".into(),
                table_id: "tour_t".into(),
            },
            schema: None,
            source_format: Some("CSV".into()),
            write_disposition: None,
        };

        let job = jobs::insert_load(
            &client_for(&server),
            &job_ref,
            load,
            b"first\nsecond\nthird",
            "application/octet-stream",
        )
        .await
        .unwrap();

        assert_eq!(
            job.job_reference.and_then(|r| r.location).as_deref(),
            Some("US")
        );
    }

    /// Test job listing repeats the state filter
    #[tokio::test]
    async fn test_job_list_state_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/jobs"))
            .and(query_param("stateFilter", "pending"))
            .and(query_param("stateFilter", "running"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobs": [{
                    "id": "test-project:US.job_1",
                    "jobReference": {"projectId": "test-project", "jobId": "job_1", "location": "US"},
                    "state": "RUNNING"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listed = jobs::list(&client_for(&server), "test-project", &["pending", "running"])
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state.as_deref(), Some("RUNNING"));
    }

    /// Test rate limiting (429) response is not retried
    #[tokio::test]
    async fn test_rate_limit_429() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let err = bqtour::gcp::projects::list_projects(&client_for(&server))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(
            bqtour::gcp::http::format_gcp_error(&err),
            "Rate limit exceeded. Please try again later."
        );
    }
}
