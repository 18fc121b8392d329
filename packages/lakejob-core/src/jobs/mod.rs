//! Data Lake Analytics job management.
//!
//! Provides the job service client, job models, and the submit-then-poll
//! sequence used by the CLI.

mod client;
mod models;
mod monitor;

use crate::http::HttpClient;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use client::{JobClient, JOB_API_VERSION};
pub use models::{JobErrorDetails, JobInformation, JobProperties, JobResult, JobState, JobType};
pub use monitor::{
    wait_for_completion, JobProgress, PollPolicy, ProgressCallback, DEFAULT_MAX_POLL_INTERVAL,
    DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};

/// Name of the sample job
pub const HELLO_WORLD_JOB_NAME: &str = "HelloWorld";

/// Sample U-SQL script that writes a single-row CSV
pub const HELLO_WORLD_SCRIPT: &str = r#"@a = SELECT * FROM (VALUES ("Hello, World!")) AS T(message); OUTPUT @a TO "/Samples/Output/HelloWorld.csv" USING Outputters.Csv();"#;

/// Job service errors
#[derive(Debug, Error)]
pub enum JobError {
    /// The request never produced a response
    #[error("Request to job service failed: {0}")]
    Transport(String),

    /// The service answered with an error status
    #[error("Job service returned {status} ({code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    /// The response could not be understood
    #[error("Unexpected response from job service: {0}")]
    InvalidResponse(String),

    /// The poll policy's timeout elapsed before the job ended
    #[error("Job {job_id} did not end within {elapsed:?}")]
    TimedOut { job_id: Uuid, elapsed: Duration },

    /// Waiting was cancelled before the job ended
    #[error("Stopped waiting for job {job_id}")]
    Cancelled { job_id: Uuid },
}

/// A job accepted by the service
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job_id: Uuid,
    pub info: JobInformation,
}

/// Submit a job under a freshly generated id. Issues exactly one create call.
pub async fn submit<C: HttpClient>(
    client: &JobClient<C>,
    account: &str,
    job: &JobInformation,
) -> Result<SubmittedJob, JobError> {
    let job_id = Uuid::new_v4();
    let info = client.create_job(account, &job_id, job).await?;

    tracing::info!(
        "Submitted job '{}' as {} (state: {})",
        job.name,
        job_id,
        info.state()
    );
    Ok(SubmittedJob { job_id, info })
}

/// Submit a job and poll it until it ends.
pub async fn submit_and_wait<C: HttpClient>(
    client: &JobClient<C>,
    account: &str,
    job: &JobInformation,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> Result<JobInformation, JobError> {
    let submitted = submit(client, account, job).await?;
    wait_for_completion(client, account, &submitted.job_id, policy, cancel, on_progress).await
}
