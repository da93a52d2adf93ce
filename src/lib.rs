//! Client for the PMHC MDS data-collection portal.
//!
//! The portal processes uploads and extracts asynchronously and offers no
//! notifications, so every flow ends in a [`JobPoller`] session that reads
//! the relevant listing until the job reaches `Completed` or `Error`.
//!
//! ```no_run
//! use pmhc::{PmhcClient, PmhcConfig, PollSettings, download_extract, ExtractRequest};
//!
//! # async fn example() -> pmhc::Result<()> {
//! let config = PmhcConfig::load().map_err(|e| pmhc::PmhcError::Config(e.to_string()))?;
//! let client = PmhcClient::new(&config)?;
//! let today = chrono::Utc::now().date_naive();
//! let request = ExtractRequest::last_30_days(config.organisation_path.clone(), today);
//! let settings = PollSettings::from_config(&config);
//! let path = download_extract(&client, &request, std::path::Path::new("."), &settings).await?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pmhc;
pub mod poller;
pub mod ui;

pub use config::PmhcConfig;
pub use error::{PmhcError, Result};
pub use pmhc::{
    ExtractRequest, PmhcClient, PollSettings, Specification, download_extract, upload_and_wait,
};
pub use poller::{
    JobPoller, JobStatus, JobStatusEntry, PollError, PollOutcome, PollReport, StatusSource,
    TransportError,
};
