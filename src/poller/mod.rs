mod error;
mod job;
mod session;

pub use error::{PollError, TransportError};
pub use job::{AttemptOutcome, JobStatus, JobStatusEntry, PollAttempt, PollOutcome, PollReport};
pub use session::{JobPoller, StatusSource};
