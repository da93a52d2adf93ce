//! [`StatusSource`] implementations over the portal's list endpoints.
//!
//! The single-extract fetch endpoint answers "not ready yet" and "failed on
//! the server" with the same 400 response, so status is always read from the
//! listing and filtered locally. The fetch endpoint is only handed out as
//! the result location once the listing says `Completed`.

use tracing::debug;

use super::client::PmhcClient;
use crate::poller::{JobStatus, JobStatusEntry, StatusSource, TransportError};

/// Status of extracts, read from `GET /api/extract`.
pub struct ExtractFeed<'a> {
    client: &'a PmhcClient,
}

impl<'a> ExtractFeed<'a> {
    pub fn new(client: &'a PmhcClient) -> Self {
        Self { client }
    }
}

impl StatusSource for ExtractFeed<'_> {
    async fn fetch_status_list(&self, job_id: &str) -> Result<Vec<JobStatusEntry>, TransportError> {
        let records = self.client.list_extracts().await?;
        let mut entries = Vec::with_capacity(records.len());

        for record in records {
            let Some(status) = parse_status(job_id, &record.uuid, record.status.as_deref())? else {
                continue;
            };
            let mut entry = JobStatusEntry::new(record.uuid.clone(), status);
            match status {
                JobStatus::Completed => {
                    entry = entry.with_result_location(self.client.extract_fetch_url(&record.uuid));
                }
                JobStatus::Error => {
                    if let Some(detail) = record.error_detail() {
                        entry = entry.with_error_detail(detail);
                    }
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

/// Status of one user's uploads, read from `GET /api/uploads`.
pub struct UploadFeed<'a> {
    client: &'a PmhcClient,
    username: &'a str,
}

impl<'a> UploadFeed<'a> {
    pub fn new(client: &'a PmhcClient, username: &'a str) -> Self {
        Self { client, username }
    }
}

impl StatusSource for UploadFeed<'_> {
    async fn fetch_status_list(&self, job_id: &str) -> Result<Vec<JobStatusEntry>, TransportError> {
        let records = self.client.list_uploads(self.username).await?;
        let mut entries = Vec::with_capacity(records.len());

        for record in records {
            let Some(status) = parse_status(job_id, &record.uuid, record.status.as_deref())? else {
                continue;
            };
            let mut entry = JobStatusEntry::new(record.uuid.clone(), status);
            match status {
                JobStatus::Completed => {
                    entry = entry.with_result_location(self.client.upload_report_url(&record.uuid));
                }
                // An errored upload failed validation; the listing carries no
                // diagnostic, the upload's error report does.
                JobStatus::Error if record.uuid == job_id => {
                    let report = self.client.upload_error_report(&record.uuid).await?;
                    entry = entry.with_error_detail(report);
                }
                JobStatus::Error | JobStatus::Queued | JobStatus::Processing => {}
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

/// Map a listed status. Records without an id or with an unrecognised
/// status are skipped, unless they are the job being waited on.
fn parse_status(
    job_id: &str,
    record_id: &str,
    raw: Option<&str>,
) -> Result<Option<JobStatus>, TransportError> {
    if record_id.is_empty() {
        debug!(?raw, "skipping entry without an id");
        return Ok(None);
    }
    match raw.and_then(JobStatus::from_remote) {
        Some(status) => Ok(Some(status)),
        None if record_id == job_id => Err(TransportError::Malformed(format!(
            "unrecognised status {raw:?} for job {job_id}"
        ))),
        None => {
            debug!(record_id, ?raw, "skipping entry with unrecognised status");
            Ok(None)
        }
    }
}
