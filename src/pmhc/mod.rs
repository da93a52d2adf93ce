pub mod client;
pub mod feed;
pub mod types;
pub mod workflow;

pub use client::PmhcClient;
pub use feed::{ExtractFeed, UploadFeed};
pub use types::{ExtractRecord, ExtractRequest, Specification, UploadRecord};
pub use workflow::{PollSettings, download_extract, upload_and_wait};
