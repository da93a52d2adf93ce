//! Configuration loaded from `pmhc.toml`.
//!
//! Every field has a default. `PMHC_ORGANISATION_PATH`, `PMHC_USERNAME` and
//! `PMHC_SESSION_COOKIE` take precedence over the file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://pmhc-mds.net";
pub const DEFAULT_UPLOADER_URL: &str = "https://uploader.strategicdata.com.au/upload";

/// Top-level configuration loaded from `pmhc.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PmhcConfig {
    /// Root URL of the portal; the session cookie is only sent below it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Endpoint files are `PUT` to before being registered with the portal.
    #[serde(default = "default_uploader_url")]
    pub uploader_url: String,

    /// Organisation path used for uploads and as the default extract scope (e.g. `PHN105`).
    #[serde(default)]
    pub organisation_path: String,

    /// PMHC username whose upload queue is inspected.
    #[serde(default)]
    pub username: String,

    /// Cookie header of an already authenticated portal session.
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// Timed-out status requests tolerated per polling session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay between checks while waiting for the upload queue to drain.
    #[serde(default = "default_queue_poll_interval_secs")]
    pub queue_poll_interval_secs: u64,

    /// Per-request HTTP timeout in seconds. Exceeding it counts as a retry.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Default portal: https://pmhc-mds.net.
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

// Default uploader: the Strategic Data upload endpoint.
fn default_uploader_url() -> String {
    DEFAULT_UPLOADER_URL.to_string()
}

// Default value for max retries: 20.
fn default_max_retries() -> u32 {
    20
}

// Default poll interval: 30s.
fn default_poll_interval_secs() -> u64 {
    30
}

// Default upload queue poll interval: 10s.
fn default_queue_poll_interval_secs() -> u64 {
    10
}

// Default request timeout: 60s.
fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for PmhcConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            uploader_url: default_uploader_url(),
            organisation_path: String::new(),
            username: String::new(),
            session_cookie: None,
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            queue_poll_interval_secs: default_queue_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PmhcConfig {
    /// Load `pmhc.toml` from the current directory, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("pmhc.toml"))
    }

    /// Load `path`, using defaults when it does not exist, then apply `PMHC_*` overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<PmhcConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(org) = non_empty("PMHC_ORGANISATION_PATH") {
            self.organisation_path = org;
        }
        if let Some(user) = non_empty("PMHC_USERNAME") {
            self.username = user;
        }
        if let Some(cookie) = non_empty("PMHC_SESSION_COOKIE") {
            self.session_cookie = Some(cookie);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_secs(self.queue_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
