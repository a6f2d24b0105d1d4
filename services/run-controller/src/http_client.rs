//! HTTP client for the external job system.
//!
//! - Triggers a job with `POST {url}/build` (empty body)
//! - Queries status with `GET {url}`
//!
//! Any HTTP status is returned as a response. Only transport and body-read
//! failures are errors, and they are never retried here.

use std::time::Duration;

use async_trait::async_trait;
use runrelay_reconcile::{JobClient, JobClientError, JobResponse};
use tracing::debug;

/// reqwest-backed [`JobClient`].
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    client: reqwest::Client,
}

impl HttpJobClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn trigger(&self, url: &str) -> Result<String, JobClientError> {
        let target = format!("{url}/build");
        debug!(url = %target, "Triggering job");

        let response = self
            .client
            .post(&target)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| transport(&target, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| JobClientError::Body {
            url: target.clone(),
            message: e.to_string(),
        })?;

        debug!(url = %target, status = %status, "Job trigger response");
        Ok(body)
    }

    async fn query_status(&self, url: &str) -> Result<JobResponse, JobClientError> {
        debug!(url = %url, "Querying job status");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| JobClientError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(JobResponse { status, body })
    }
}

fn transport(url: &str, e: reqwest::Error) -> JobClientError {
    JobClientError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    }
}
