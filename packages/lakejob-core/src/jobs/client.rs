//! REST client for the Data Lake Analytics job service.

use crate::auth::TokenCredential;
use crate::http::{default_client, HttpClient};
use crate::jobs::models::JobInformation;
use crate::jobs::JobError;
use serde::Deserialize;
use uuid::Uuid;

/// REST API version of the job service
pub const JOB_API_VERSION: &str = "2016-11-01";

/// Client for the Data Lake Analytics job service.
///
/// Holds the credential for its whole lifetime; construct it only after authenticating.
#[derive(Debug, Clone)]
pub struct JobClient<C = reqwest::Client> {
    http: C,
    credential: TokenCredential,
    dns_suffix: String,
}

impl JobClient {
    pub fn new(credential: TokenCredential, dns_suffix: &str) -> Self {
        Self::with_http(default_client(), credential, dns_suffix)
    }
}

impl<C: HttpClient> JobClient<C> {
    pub fn with_http(http: C, credential: TokenCredential, dns_suffix: &str) -> Self {
        Self {
            http,
            credential,
            dns_suffix: dns_suffix.trim_matches('.').to_string(),
        }
    }

    pub fn credential(&self) -> &TokenCredential {
        &self.credential
    }

    fn job_url(&self, account: &str, job_id: &Uuid, action: Option<&str>) -> String {
        let action = action.map(|a| format!("/{}", a)).unwrap_or_default();
        format!(
            "https://{}.{}/Jobs/{}{}?api-version={}",
            account, self.dns_suffix, job_id, action, JOB_API_VERSION
        )
    }

    /// Submit a job under the given id.
    pub async fn create_job(
        &self,
        account: &str,
        job_id: &Uuid,
        job: &JobInformation,
    ) -> Result<JobInformation, JobError> {
        let body = serde_json::to_vec(job)
            .map_err(|e| JobError::InvalidResponse(format!("failed to encode job: {}", e)))?;

        tracing::debug!("Creating job {} ('{}') on account {}", job_id, job.name, account);
        let body = self
            .send(http::Method::PUT, self.job_url(account, job_id, None), body)
            .await?;
        parse_job(&body)
    }

    /// Fetch the current job record.
    pub async fn get_job(&self, account: &str, job_id: &Uuid) -> Result<JobInformation, JobError> {
        let body = self
            .send(http::Method::GET, self.job_url(account, job_id, None), Vec::new())
            .await?;
        parse_job(&body)
    }

    /// Ask the service to cancel a running job.
    pub async fn cancel_job(&self, account: &str, job_id: &Uuid) -> Result<(), JobError> {
        tracing::info!("Cancelling job {} on account {}", job_id, account);
        self.send(
            http::Method::POST,
            self.job_url(account, job_id, Some("CancelJob")),
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    async fn send(
        &self,
        method: http::Method,
        url: String,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, JobError> {
        if self.credential.is_expired() {
            tracing::warn!("Access token has expired; the job service will likely reject it");
        }

        let mut builder = http::Request::builder()
            .method(method)
            .uri(&url)
            .header(http::header::AUTHORIZATION, self.credential.authorization_header())
            .header(http::header::ACCEPT, "application/json");
        if !body.is_empty() {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body)
            .map_err(|e| JobError::Transport(e.to_string()))?;

        let resp = self
            .http
            .send_http(request)
            .await
            .map_err(|e| JobError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.into_body();
        if status.is_success() {
            return Ok(body);
        }

        let (code, message) = match serde_json::from_slice::<ServiceErrorResponse>(&body) {
            Ok(err) => (err.error.code, err.error.message),
            Err(_) => (None, String::from_utf8_lossy(&body).into_owned()),
        };
        tracing::error!("Job service request failed: {} - {}", status, message);
        Err(JobError::Service {
            status: status.as_u16(),
            code: code.unwrap_or_else(|| "Unknown".to_string()),
            message,
        })
    }
}

fn parse_job(body: &[u8]) -> Result<JobInformation, JobError> {
    serde_json::from_slice(body)
        .map_err(|e| JobError::InvalidResponse(format!("job response: {}", e)))
}

#[derive(Debug, Deserialize)]
struct ServiceErrorResponse {
    error: ServiceError,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    code: Option<String>,
    #[serde(default)]
    message: String,
}
