//! End-to-end portal flows built on [`JobPoller`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::client::PmhcClient;
use super::types::ExtractRequest;
use crate::config::PmhcConfig;
use crate::error::{PmhcError, Result};
use crate::poller::{JobPoller, PollError, PollOutcome, PollReport, TransportError};
use crate::ui::PollProgress;

/// Polling parameters shared by the workflows.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub queue_poll_interval: Duration,
    /// Draw a spinner while waiting.
    pub show_progress: bool,
}

impl PollSettings {
    pub fn from_config(config: &PmhcConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
            queue_poll_interval: config.queue_poll_interval(),
            show_progress: false,
        }
    }

    fn progress(&self, label: &str) -> PollProgress {
        if self.show_progress {
            PollProgress::start(label)
        } else {
            PollProgress::hidden()
        }
    }
}

/// Queue an extract, wait for it, and download the archive into `output_dir`.
///
/// Returns the path of the saved `pmhc_extract_{start}_{end}.zip`.
pub async fn download_extract(
    client: &PmhcClient,
    request: &ExtractRequest,
    output_dir: &Path,
    settings: &PollSettings,
) -> Result<PathBuf> {
    let uuid = client.request_extract(request).await?;

    let report = JobPoller::new(client.extracts())
        .with_progress(settings.progress("Waiting for extract..."))
        .wait_for_completion(&uuid, settings.max_retries, settings.poll_interval)
        .await?;

    let fetch_url = match report.outcome {
        PollOutcome::Completed { result_location } => result_location,
        PollOutcome::Failed { error_detail } => {
            return Err(PmhcError::JobFailed {
                job_id: uuid,
                detail: error_detail,
            });
        }
    };

    let location = retry_on_timeout(settings.max_retries, settings.poll_interval, || {
        client.fetch_extract_location(&fetch_url)
    })
    .await?;

    let output = output_dir.join(request.output_file_name());
    info!(uuid, output = %output.display(), "downloading extract");
    client.download_to(&location, &output).await
}

/// Upload a file and wait for the portal to finish processing it.
///
/// A `Failed` outcome means the upload has validation errors. Its
/// `error_detail` is the portal's JSON error report, verbatim; save it with
/// [`PmhcClient::download_error_json`].
pub async fn upload_and_wait(
    client: &PmhcClient,
    file: &Path,
    test: bool,
    username: &str,
    settings: &PollSettings,
) -> Result<PollReport> {
    let uuid = client
        .upload_file(file, test, username, settings.queue_poll_interval)
        .await?;

    let report = JobPoller::new(client.uploads(username))
        .with_progress(settings.progress("Waiting for PMHC processing..."))
        .wait_for_completion(&uuid, settings.max_retries, settings.poll_interval)
        .await?;
    Ok(report)
}

/// Run `op` until it succeeds, retrying only timeouts, at most
/// `max_retries` times, sleeping `interval` between tries.
async fn retry_on_timeout<T, F, Fut>(
    max_retries: u32,
    interval: Duration,
    mut op: F,
) -> std::result::Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, TransportError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(TransportError::Timeout(reason)) => {
                retries += 1;
                if retries > max_retries {
                    return Err(PollError::RetriesExhausted {
                        attempts: retries,
                        max_retries,
                    });
                }
                warn!("Request timed out ({retries} of {max_retries}): {reason}. Retrying.");
                sleep(interval).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use reqwest::Client;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> PollSettings {
        PollSettings {
            max_retries: 2,
            poll_interval: Duration::from_millis(5),
            queue_poll_interval: Duration::from_millis(5),
            show_progress: false,
        }
    }

    fn client_for(server: &MockServer) -> PmhcClient {
        PmhcClient::with_client(
            Client::new(),
            &server.uri(),
            &format!("{}/upload", server.uri()),
            "PHN105",
        )
    }

    fn request() -> ExtractRequest {
        ExtractRequest::last_30_days("PHN105", NaiveDate::from_ymd_opt(2023, 3, 31).unwrap())
    }

    async fn mount_extract_queue(server: &MockServer, listing: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/extract/csv"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"uuid": "ex-1"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing))
            .mount(server)
            .await;
    }

    #[test]
    fn settings_from_config() {
        let config = PmhcConfig {
            max_retries: 7,
            poll_interval_secs: 3,
            ..PmhcConfig::default()
        };
        let settings = PollSettings::from_config(&config);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
        assert_eq!(settings.queue_poll_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn download_extract_saves_archive() {
        let server = MockServer::start().await;
        mount_extract_queue(
            &server,
            serde_json::json!([
                {"uuid": "older", "status": "Completed"},
                {"uuid": "ex-1", "status": "Completed"}
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/extract/ex-1/fetch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": format!("{}/files/ex-1.zip", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/ex-1.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let saved = download_extract(&client_for(&server), &request(), dir.path(), &settings())
            .await
            .unwrap();

        assert_eq!(
            saved,
            dir.path().join("pmhc_extract_2023-03-01_2023-03-31.zip")
        );
        assert_eq!(std::fs::read(saved).unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn download_extract_reports_server_failure() {
        let server = MockServer::start().await;
        mount_extract_queue(
            &server,
            serde_json::json!([
                {"uuid": "ex-1", "status": "Error", "stash": {"error": "out of memory"}}
            ]),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let err = download_extract(&client_for(&server), &request(), dir.path(), &settings())
            .await
            .unwrap_err();

        match err {
            PmhcError::JobFailed { job_id, detail } => {
                assert_eq!(job_id, "ex-1");
                assert_eq!(detail, "out of memory");
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_extract_for_unlisted_job_fails_fast() {
        let server = MockServer::start().await;
        mount_extract_queue(&server, serde_json::json!([])).await;

        let dir = tempfile::tempdir().unwrap();
        let err = download_extract(&client_for(&server), &request(), dir.path(), &settings())
            .await
            .unwrap_err();

        assert!(matches!(err, PmhcError::Poll(PollError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn upload_and_wait_returns_report() {
        let server = MockServer::start().await;
        // Queue check sees an empty list, status polling then sees the new upload.
        Mock::given(method("GET"))
            .and(path("/api/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"uuid": "u-9", "status": "error"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u-9"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/organisations/PHN105/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        let validation_report = r#"{"errors":[{"file":"episodes.csv","row":12,"message":"invalid date"}]}"#;
        Mock::given(method("GET"))
            .and(path("/api/organisations/PHN105/uploads/u-9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(validation_report))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("round_2.zip");
        std::fs::write(&file, b"PK\x03\x04").unwrap();

        let report = upload_and_wait(&client_for(&server), &file, true, "jdoe", &settings())
            .await
            .unwrap();

        assert_eq!(report.job_id, "u-9");
        assert_eq!(
            report.outcome,
            PollOutcome::Failed {
                error_detail: validation_report.to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_timeout_recovers() {
        let calls = AtomicU32::new(0);
        let value = retry_on_timeout(2, Duration::from_secs(30), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransportError::Timeout("slow".into()))
            } else {
                Ok("location")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "location");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_timeout_gives_up() {
        let err = retry_on_timeout::<(), _, _>(1, Duration::from_secs(30), || async {
            Err(TransportError::Timeout("slow".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            PollError::RetriesExhausted {
                attempts: 2,
                max_retries: 1
            }
        );
    }

    #[tokio::test]
    async fn retry_on_timeout_does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let err = retry_on_timeout::<(), _, _>(5, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Status {
                status: 400,
                body: "Extract has expired".into(),
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Transport(TransportError::Status { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
