use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::error::{PollError, TransportError};
use super::job::{AttemptOutcome, JobStatus, JobStatusEntry, PollAttempt, PollOutcome, PollReport};
use crate::ui::PollProgress;

/// Supplies the current status listing for a job.
///
/// Implementations perform exactly one request per call and must report
/// timeouts as [`TransportError::Timeout`] so the poller can tell them apart
/// from failures that retrying will not fix.
#[allow(async_fn_in_trait)]
pub trait StatusSource {
    async fn fetch_status_list(&self, job_id: &str) -> Result<Vec<JobStatusEntry>, TransportError>;
}

impl<T: StatusSource> StatusSource for &T {
    async fn fetch_status_list(&self, job_id: &str) -> Result<Vec<JobStatusEntry>, TransportError> {
        (**self).fetch_status_list(job_id).await
    }
}

/// Waits for a remotely processed job to reach a terminal status.
///
/// Only timeouts consume the retry budget. Queued/Processing responses are
/// waited on for as long as they keep coming.
pub struct JobPoller<S> {
    source: S,
    progress: Option<PollProgress>,
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            progress: None,
        }
    }

    /// Mirror every attempt on a terminal spinner.
    pub fn with_progress(mut self, progress: PollProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Poll until `job_id` is Completed or Error, or until more than
    /// `max_retries` requests have timed out.
    ///
    /// Sleeps `poll_interval` before every request, including the first.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        max_retries: u32,
        poll_interval: Duration,
    ) -> Result<PollReport, PollError> {
        if job_id.trim().is_empty() {
            return Err(PollError::InvalidRequest("job id must not be empty".into()));
        }
        if poll_interval.is_zero() {
            return Err(PollError::InvalidRequest("poll interval must be positive".into()));
        }

        let started_at = Utc::now();
        let mut attempts: Vec<PollAttempt> = Vec::new();
        let mut retries: u32 = 0;

        let result = loop {
            if retries > max_retries {
                break Err(PollError::RetriesExhausted {
                    attempts: attempts.len() as u32,
                    max_retries,
                });
            }

            sleep(poll_interval).await;
            let attempt_number = attempts.len() as u32 + 1;
            debug!(job_id, attempt_number, "fetching status listing");

            let entries = match self.source.fetch_status_list(job_id).await {
                Ok(entries) => entries,
                Err(TransportError::Timeout(reason)) => {
                    retries += 1;
                    warn!(
                        job_id,
                        "Request timed out (attempt {retries} of {max_retries}): {reason}. Retrying."
                    );
                    if let Some(progress) = &self.progress {
                        progress.retry(retries, max_retries, "request timed out");
                    }
                    attempts.push(PollAttempt {
                        attempt_number,
                        at: Utc::now(),
                        outcome: AttemptOutcome::TransientNetworkFailure,
                    });
                    continue;
                }
                Err(err) => break Err(PollError::Transport(err)),
            };

            let Some(entry) = entries.into_iter().find(|e| e.job_id == job_id) else {
                break Err(PollError::JobNotFound(job_id.to_string()));
            };

            if let Some(progress) = &self.progress {
                progress.update_status(job_id, entry.status);
            }
            attempts.push(PollAttempt {
                attempt_number,
                at: Utc::now(),
                outcome: AttemptOutcome::StatusFetched(entry.clone()),
            });

            match entry.status {
                JobStatus::Completed => {
                    let Some(result_location) = entry.result_location else {
                        break Err(PollError::Transport(TransportError::Malformed(format!(
                            "job {job_id} completed without a result location"
                        ))));
                    };
                    info!(job_id, attempt_number, "job completed");
                    break Ok(PollOutcome::Completed { result_location });
                }
                JobStatus::Error => {
                    let error_detail = entry
                        .error_detail
                        .unwrap_or_else(|| "no error detail reported".to_string());
                    error!(job_id, "job failed on the remote service: {error_detail}");
                    break Ok(PollOutcome::Failed { error_detail });
                }
                JobStatus::Queued | JobStatus::Processing => {
                    debug!(job_id, status = %entry.status, "job still in progress");
                }
            }
        };

        match result {
            Ok(outcome) => {
                if let Some(progress) = &self.progress {
                    progress.complete(&outcome);
                }
                Ok(PollReport {
                    job_id: job_id.to_string(),
                    outcome,
                    attempts,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(err) => {
                if let Some(progress) = &self.progress {
                    progress.abandon(&err.to_string());
                }
                Err(err)
            }
        }
    }
}
