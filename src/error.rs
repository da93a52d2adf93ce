use std::path::PathBuf;

use thiserror::Error;

use crate::poller::{PollError, TransportError};

#[derive(Debug, Error)]
pub enum PmhcError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("PMHC session is not authenticated: {0}")]
    InvalidSession(String),

    #[error("Only .xlsx or .zip (containing multiple csv's) are acceptable PMHC input files: {0}")]
    IncorrectFileType(PathBuf),

    #[error("Input file does not exist: {0}")]
    FileNotFound(PathBuf),

    #[error(
        "No extract uuid in response: {0}. Ensure your PMHC user has the 'Reporting' role \
         and the organisation path is correct."
    )]
    MissingExtractId(String),

    #[error("No upload id in uploader response: {0}")]
    MissingUploadId(String),

    #[error("No upload named {0} found for this user")]
    UploadNotFound(String),

    #[error("PMHC job {job_id} failed on the server: {detail}")]
    JobFailed { job_id: String, detail: String },

    #[error("Polling error: {0}")]
    Poll(#[from] PollError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PmhcError>;
