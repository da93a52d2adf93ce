use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote status of an asynchronously processed job.
///
/// `Queued` and `Processing` only ever move forward into one of the two
/// terminal states, `Completed` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Parse a status string as reported by the portal.
    ///
    /// Extract listings use `Completed`/`Processing`, upload listings use
    /// lowercase `complete`/`processing`, so matching is case-insensitive and
    /// accepts both spellings. Returns `None` for anything unrecognised.
    pub fn from_remote(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" | "complete" => Some(JobStatus::Completed),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    /// Whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Processing => write!(f, "Processing"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Error => write!(f, "Error"),
        }
    }
}

/// One job as listed by the remote service at the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub job_id: String,
    pub status: JobStatus,
    /// Diagnostic payload, only meaningful when `status` is `Error`.
    pub error_detail: Option<String>,
    /// Where the output can be fetched, only meaningful when `status` is `Completed`.
    pub result_location: Option<String>,
}

impl JobStatusEntry {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            error_detail: None,
            result_location: None,
        }
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_result_location(mut self, location: impl Into<String>) -> Self {
        self.result_location = Some(location.into());
        self
    }
}

/// What a single polling cycle observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    StatusFetched(JobStatusEntry),
    TransientNetworkFailure,
}

/// One polling cycle. Numbers start at 1 and increase by one per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAttempt {
    pub attempt_number: u32,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// Terminal result of a polling session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollOutcome {
    Completed { result_location: String },
    Failed { error_detail: String },
}

impl std::fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollOutcome::Completed { result_location } => {
                write!(f, "completed ({result_location})")
            }
            PollOutcome::Failed { error_detail } => write!(f, "failed: {error_detail}"),
        }
    }
}

/// Self-contained record of one polling session, produced when a terminal
/// status was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollReport {
    pub job_id: String,
    pub outcome: PollOutcome,
    pub attempts: Vec<PollAttempt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PollReport {
    /// Number of polling cycles performed, including timed-out ones.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Number of cycles lost to transient network failures.
    pub fn timeout_count(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::TransientNetworkFailure)
            .count() as u32
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_both_portal_spellings() {
        assert_eq!(JobStatus::from_remote("Completed"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::from_remote("complete"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::from_remote("processing"), Some(JobStatus::Processing));
        assert_eq!(JobStatus::from_remote("Queued"), Some(JobStatus::Queued));
        assert_eq!(JobStatus::from_remote(" Error "), Some(JobStatus::Error));
        assert_eq!(JobStatus::from_remote("Expired"), None);
    }

    #[test]
    fn only_completed_and_error_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn entry_builders_fill_optional_fields() {
        let entry = JobStatusEntry::new("abc", JobStatus::Error).with_error_detail("disk full");
        assert_eq!(entry.error_detail.as_deref(), Some("disk full"));
        assert!(entry.result_location.is_none());
    }

    #[test]
    fn report_counts_timeouts() {
        let now = Utc::now();
        let report = PollReport {
            job_id: "abc".into(),
            outcome: PollOutcome::Completed {
                result_location: "X".into(),
            },
            attempts: vec![
                PollAttempt {
                    attempt_number: 1,
                    at: now,
                    outcome: AttemptOutcome::TransientNetworkFailure,
                },
                PollAttempt {
                    attempt_number: 2,
                    at: now,
                    outcome: AttemptOutcome::StatusFetched(
                        JobStatusEntry::new("abc", JobStatus::Completed)
                            .with_result_location("X"),
                    ),
                },
            ],
            started_at: now,
            finished_at: now,
        };
        assert_eq!(report.attempt_count(), 2);
        assert_eq!(report.timeout_count(), 1);
        assert_eq!(report.duration_ms(), 0);
    }

    #[test]
    fn outcome_display() {
        let failed = PollOutcome::Failed {
            error_detail: "disk full".into(),
        };
        assert_eq!(failed.to_string(), "failed: disk full");
    }
}
