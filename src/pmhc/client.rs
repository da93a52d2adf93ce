use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info};

use super::feed::{ExtractFeed, UploadFeed};
use super::types::{
    CurrentUser, ExtractLocation, ExtractRecord, ExtractRequest, UploadReceipt,
    UploadRegistration, UploadRecord,
};
use crate::config::PmhcConfig;
use crate::error::{PmhcError, Result};
use crate::poller::{JobStatus, TransportError};

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// HTTP client for the PMHC portal's internal JSON API.
///
/// Authentication is not handled here: the client reuses the cookie of an
/// already authenticated browser session when one is configured. The cookie
/// is only sent to URLs under `base_url`, never to the uploader or to
/// download locations on other hosts.
#[derive(Debug, Clone)]
pub struct PmhcClient {
    client: Client,
    base_url: String,
    uploader_url: String,
    organisation_path: String,
    session_cookie: Option<HeaderValue>,
}

impl PmhcClient {
    /// Build a client from configuration, applying the request timeout to
    /// every request.
    pub fn new(config: &PmhcConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout())
            .build()?;

        let client = Self::with_client(
            client,
            &config.base_url,
            &config.uploader_url,
            &config.organisation_path,
        );
        match &config.session_cookie {
            Some(cookie) => client.with_session_cookie(cookie),
            None => Ok(client),
        }
    }

    /// Create a client around a preconfigured `reqwest::Client` (useful for testing).
    pub fn with_client(
        client: Client,
        base_url: &str,
        uploader_url: &str,
        organisation_path: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            uploader_url: uploader_url.to_string(),
            organisation_path: organisation_path.to_string(),
            session_cookie: None,
        }
    }

    /// Send `cookie` with every request to the portal.
    pub fn with_session_cookie(mut self, cookie: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(cookie)
            .map_err(|e| PmhcError::Config(format!("invalid session cookie: {e}")))?;
        value.set_sensitive(true);
        self.session_cookie = Some(value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn organisation_path(&self) -> &str {
        &self.organisation_path
    }

    /// Status source over the extract listing.
    pub fn extracts(&self) -> ExtractFeed<'_> {
        ExtractFeed::new(self)
    }

    /// Status source over `username`'s upload listing.
    pub fn uploads<'a>(&'a self, username: &'a str) -> UploadFeed<'a> {
        UploadFeed::new(self, username)
    }

    /// URL that yields the download location of a completed extract.
    pub fn extract_fetch_url(&self, uuid: &str) -> String {
        format!("{}/api/extract/{uuid}/fetch", self.base_url)
    }

    /// URL of the JSON error report for an upload.
    pub fn upload_report_url(&self, uuid: &str) -> String {
        format!(
            "{}/api/organisations/{}/uploads/{uuid}",
            self.base_url, self.organisation_path
        )
    }

    fn is_portal_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }

    /// Request builder that carries the session cookie when `url` is on the portal.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.session_cookie {
            Some(cookie) if self.is_portal_url(url) => builder.header(COOKIE, cookie.clone()),
            _ => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, TransportError> {
        let response = request.send().await?;
        let bytes = Self::success_body(response).await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    async fn success_body(response: Response) -> std::result::Result<Vec<u8>, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Confirm the session is authenticated and return the PMHC username.
    pub async fn current_user(&self) -> Result<String> {
        let url = format!("{}/api/current-user", self.base_url);
        let user: CurrentUser = match self.send_json(self.request(Method::GET, &url)).await {
            Ok(user) => user,
            Err(TransportError::Status { status, body }) if status == 401 || status == 403 => {
                return Err(PmhcError::InvalidSession(body));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = user.error {
            return Err(PmhcError::InvalidSession(error.to_string()));
        }
        user.username
            .ok_or_else(|| PmhcError::InvalidSession("no username in current-user response".into()))
    }

    /// All extracts visible to the session, newest first.
    pub async fn list_extracts(&self) -> std::result::Result<Vec<ExtractRecord>, TransportError> {
        let url = format!("{}/api/extract", self.base_url);
        self.send_json(self.request(Method::GET, &url).query(&[("sort", "-date")]))
            .await
    }

    /// Queue a CSV extract and return its uuid.
    pub async fn request_extract(&self, request: &ExtractRequest) -> Result<String> {
        let url = format!("{}/api/extract/csv", self.base_url);
        let body: serde_json::Value = self
            .send_json(self.request(Method::GET, &url).query(&request.query_params()))
            .await?;

        match body.get("uuid").and_then(|v| v.as_str()) {
            Some(uuid) => {
                info!(uuid, organisation = %request.organisation_path, "extract queued");
                Ok(uuid.to_string())
            }
            None => Err(PmhcError::MissingExtractId(body.to_string())),
        }
    }

    /// Resolve the download location of a completed extract from its fetch URL.
    pub async fn fetch_extract_location(
        &self,
        fetch_url: &str,
    ) -> std::result::Result<String, TransportError> {
        let location: ExtractLocation = self.send_json(self.request(Method::GET, fetch_url)).await?;
        Ok(location.location)
    }

    /// Download `url` to `path`, returning the path written.
    pub async fn download_to(&self, url: &str, path: &Path) -> Result<PathBuf> {
        let response = self.request(Method::GET, url).send().await?;
        let body = Self::success_body(response).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &body).await?;
        info!(path = %path.display(), bytes = body.len(), "saved download");
        Ok(path.to_path_buf())
    }

    /// `username`'s uploads (test and live), newest first.
    pub async fn list_uploads(
        &self,
        username: &str,
    ) -> std::result::Result<Vec<UploadRecord>, TransportError> {
        let url = format!("{}/api/uploads", self.base_url);
        self.send_json(
            self.request(Method::GET, &url)
                .query(&[("username", username), ("sort", "-date")]),
        )
        .await
    }

    /// Most recent upload of `username` named `filename`.
    pub async fn find_upload(&self, username: &str, filename: &str) -> Result<UploadRecord> {
        let uploads = self.list_uploads(username).await?;
        uploads
            .into_iter()
            .find(|u| u.filename.as_deref() == Some(filename))
            .ok_or_else(|| PmhcError::UploadNotFound(filename.to_string()))
    }

    /// Whether `username` has an upload the portal is still processing.
    pub async fn is_upload_processing(
        &self,
        username: &str,
    ) -> std::result::Result<bool, TransportError> {
        let uploads = self.list_uploads(username).await?;
        Ok(uploads
            .iter()
            .any(|u| u.job_status() == Some(JobStatus::Processing)))
    }

    /// Block until `username` has no upload in processing.
    ///
    /// The portal processes one upload per account at a time.
    pub async fn wait_for_upload_queue(
        &self,
        username: &str,
        interval: Duration,
    ) -> std::result::Result<(), TransportError> {
        while self.is_upload_processing(username).await? {
            info!(username, "waiting for PMHC to finish processing a previous upload");
            sleep(interval).await;
        }
        Ok(())
    }

    /// Upload an `.xlsx` or `.zip` file in test or live mode and return the
    /// upload uuid.
    ///
    /// Waits for the account's upload queue to be free first.
    pub async fn upload_file(
        &self,
        path: &Path,
        test: bool,
        username: &str,
        queue_interval: Duration,
    ) -> Result<String> {
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Some("zip") => "application/zip",
            _ => return Err(PmhcError::IncorrectFileType(path.to_path_buf())),
        };
        if !path.exists() {
            return Err(PmhcError::FileNotFound(path.to_path_buf()));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PmhcError::IncorrectFileType(path.to_path_buf()))?
            .to_string();

        self.wait_for_upload_queue(username, queue_interval).await?;

        let mode = if test { "test" } else { "live" };
        info!(file = %path.display(), mode, "uploading file to PMHC");

        let contents = tokio::fs::read(path).await?;
        let part = reqwest::multipart::Part::bytes(contents)
            .file_name(filename.clone())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let receipt: UploadReceipt = self
            .send_json(self.request(Method::PUT, &self.uploader_url).multipart(form))
            .await?;
        debug!(?receipt, "uploader response");
        let Some(uuid) = receipt.id.clone() else {
            return Err(PmhcError::MissingUploadId(format!("{receipt:?}")));
        };

        // The upload only shows up in the portal once it is registered.
        let url = format!(
            "{}/api/organisations/{}/uploads",
            self.base_url, self.organisation_path
        );
        let registration = UploadRegistration {
            uuid: uuid.clone(),
            filename,
            test,
            encoded_organisation_path: self.organisation_path.clone(),
        };
        let response = self.request(Method::POST, &url).json(&registration).send().await?;
        let body = Self::success_body(response).await?;
        debug!(response = %String::from_utf8_lossy(&body), "upload registered");

        Ok(uuid)
    }

    /// JSON error report of an upload, as the portal returned it.
    pub async fn upload_error_report(
        &self,
        uuid: &str,
    ) -> std::result::Result<String, TransportError> {
        let response = self
            .request(Method::GET, &self.upload_report_url(uuid))
            .send()
            .await?;
        let body = Self::success_body(response).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Save the JSON error report of an upload to `{folder}/{uuid}.json`.
    pub async fn download_error_json(&self, uuid: &str, folder: &Path) -> Result<PathBuf> {
        let path = folder.join(format!("{uuid}.json"));
        self.download_to(&self.upload_report_url(uuid), &path).await
    }
}
