//! Job status polling.
//!
//! The default policy polls every 3 seconds forever, until the job ends. A
//! timeout, exponential backoff and external cancellation are available for
//! callers that cannot block indefinitely.

use crate::http::HttpClient;
use crate::jobs::client::JobClient;
use crate::jobs::models::{JobInformation, JobState};
use crate::jobs::JobError;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default wait between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default ceiling for backed-off intervals
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest accepted interval; anything lower is raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often and how long to poll a job
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait after the first non-terminal observation
    pub interval: Duration,
    /// Multiplier applied to the wait after every check; `1.0` keeps it fixed
    pub backoff_factor: f64,
    /// Upper bound for the wait when backing off
    pub max_interval: Duration,
    /// Give up after this long; `None` waits until the job ends
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: 1.0,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollPolicy {
    /// Poll at a fixed interval with no timeout
    pub fn fixed(interval: Duration) -> Self {
        Self::default().with_interval(interval)
    }

    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        self.interval = interval;
        if self.max_interval < interval {
            self.max_interval = interval;
        }
        self
    }

    /// Grow the interval by `factor` after each check, capped at `max_interval`.
    ///
    /// Factors below 1.0 are treated as 1.0.
    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait to use after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return current;
        }
        // Products too large for a Duration saturate at the ceiling
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Progress notification emitted for every non-terminal observation
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub state: JobState,
    /// Number of status fetches so far
    pub checks: u32,
    pub elapsed: Duration,
    /// Wait before the next status fetch
    pub next_check_in: Duration,
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(&JobProgress) + Send + Sync>;

/// Poll a job until it reaches `Ended`.
///
/// Each non-terminal observation triggers exactly one progress callback and one
/// wait. Returns the first terminal job record, or `TimedOut`/`Cancelled` when
/// the policy or the token stops the wait first. The remote job is left alone
/// in both of those cases.
pub async fn wait_for_completion<C: HttpClient>(
    client: &JobClient<C>,
    account: &str,
    job_id: &Uuid,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> Result<JobInformation, JobError> {
    let started = Instant::now();
    let mut wait = policy.interval;
    let mut checks = 0u32;

    loop {
        let job = client.get_job(account, job_id).await?;
        checks += 1;

        if job.is_ended() {
            tracing::info!(
                "Job {} ended with result {} after {} checks",
                job_id,
                job.result.unwrap_or_default(),
                checks
            );
            return Ok(job);
        }

        let elapsed = started.elapsed();
        let sleep_for = match policy.timeout {
            Some(timeout) if elapsed >= timeout => {
                tracing::warn!("Gave up waiting for job {} after {:?}", job_id, elapsed);
                return Err(JobError::TimedOut {
                    job_id: *job_id,
                    elapsed,
                });
            }
            // Never sleep past the deadline
            Some(timeout) => wait.min(timeout - elapsed),
            None => wait,
        };

        let state = job.state();
        tracing::debug!("Job {} is {}, next check in {:?}", job_id, state, sleep_for);
        if let Some(emit) = on_progress {
            emit(&JobProgress {
                job_id: *job_id,
                state,
                checks,
                elapsed,
                next_check_in: sleep_for,
            });
        }

        tokio::select! {
            _ = sleep(sleep_for) => {}
            _ = cancel.cancelled() => {
                tracing::info!("Stopped waiting for job {}", job_id);
                return Err(JobError::Cancelled { job_id: *job_id });
            }
        }

        wait = policy.next_interval(wait);
    }
}
