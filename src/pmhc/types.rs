//! Wire types of the PMHC portal's JSON API.
//!
//! Only the fields the client reads are modelled; everything else in the
//! portal's responses is ignored on deserialization.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::poller::JobStatus;

/// Data specification an extract is generated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specification {
    /// Every specification (`META 4.0`).
    #[serde(rename = "meta")]
    All,
    #[default]
    Pmhc,
    Headspace,
    Wayback,
}

impl Specification {
    /// Value of the `spec_type` query parameter.
    pub fn term(&self) -> &'static str {
        match self {
            Specification::All => "meta",
            Specification::Pmhc => "pmhc",
            Specification::Headspace => "headspace",
            Specification::Wayback => "wayback",
        }
    }

    /// Label the portal shows for the specification in its filters.
    pub fn filter_term(&self) -> &'static str {
        match self {
            Specification::All => "META 4.0",
            Specification::Pmhc => "PMHC 4.0",
            Specification::Headspace => "headspace 2.0",
            Specification::Wayback => "WAYBACK 3.0",
        }
    }
}

/// Parameters of a CSV extract request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub organisation_path: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub specification: Specification,
    /// "Include data without associated dates".
    pub without_associated_dates: bool,
    /// "Include all data associated with matched episodes".
    pub matched_episodes: bool,
}

impl ExtractRequest {
    /// Extract of the last 30 days up to `today` for `organisation_path`.
    pub fn last_30_days(organisation_path: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            organisation_path: organisation_path.into(),
            start_date: today - chrono::Duration::days(30),
            end_date: today,
            specification: Specification::default(),
            without_associated_dates: false,
            matched_episodes: false,
        }
    }

    /// Query parameters for `GET /api/extract/csv`.
    ///
    /// Boolean options are sent as `0`/`1` because the portal reads them as
    /// JavaScript booleans.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("organisation_path", self.organisation_path.clone()),
            ("encoded_organisation_path", self.organisation_path.clone()),
            ("file_type", "csv".to_string()),
            ("start_date", self.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", self.end_date.format("%Y-%m-%d").to_string()),
            ("childless", u8::from(self.without_associated_dates).to_string()),
            ("all_episode_children", u8::from(self.matched_episodes).to_string()),
            ("spec_type", self.specification.term().to_string()),
        ]
    }

    /// File name the downloaded archive is saved under.
    pub fn output_file_name(&self) -> String {
        format!("pmhc_extract_{}_{}.zip", self.start_date, self.end_date)
    }
}

/// One entry of `GET /api/extract`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uuid: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stash: Option<ExtractStash>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractStash {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ExtractRecord {
    /// Server-side diagnostic, rendered as text whatever its JSON shape.
    pub fn error_detail(&self) -> Option<String> {
        let value = self.stash.as_ref()?.error.as_ref()?;
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One entry of `GET /api/uploads`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uuid: String,
    /// `processing`, `complete` or `error`.
    #[serde(default)]
    pub status: Option<String>,
    /// Name the file was uploaded under, e.g. `20230320_094815_round_1.xlsx`.
    #[serde(default)]
    pub filename: Option<String>,
}

impl UploadRecord {
    /// Parsed status, `None` when absent or unrecognised.
    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.as_deref().and_then(JobStatus::from_remote)
    }
}

// A listing entry with a null or missing id must not fail the whole listing.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response of `GET /api/current-user`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Response of the uploader's `PUT /upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub id: Option<String>,
}

/// Body of `POST /api/organisations/{org}/uploads`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRegistration {
    pub uuid: String,
    pub filename: String,
    pub test: bool,
    pub encoded_organisation_path: String,
}

/// Response of `GET /api/extract/{uuid}/fetch`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractLocation {
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractRequest {
        ExtractRequest {
            organisation_path: "PHN105".into(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
            specification: Specification::Headspace,
            without_associated_dates: true,
            matched_episodes: false,
        }
    }

    #[test]
    fn query_params_encode_booleans_as_digits() {
        let params = request().query_params();
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("start_date"), "2023-01-01");
        assert_eq!(get("end_date"), "2023-01-31");
        assert_eq!(get("childless"), "1");
        assert_eq!(get("all_episode_children"), "0");
        assert_eq!(get("spec_type"), "headspace");
        assert_eq!(get("encoded_organisation_path"), "PHN105");
    }

    #[test]
    fn output_file_name_uses_date_range() {
        assert_eq!(
            request().output_file_name(),
            "pmhc_extract_2023-01-01_2023-01-31.zip"
        );
    }

    #[test]
    fn last_30_days_defaults_to_pmhc_spec() {
        let today = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
        let req = ExtractRequest::last_30_days("PHN105", today);
        assert_eq!(req.start_date, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
        assert_eq!(req.specification, Specification::Pmhc);
    }

    #[test]
    fn specification_terms() {
        assert_eq!(Specification::All.term(), "meta");
        assert_eq!(Specification::All.filter_term(), "META 4.0");
        assert_eq!(Specification::Wayback.filter_term(), "WAYBACK 3.0");
        let parsed: Specification = serde_json::from_str("\"meta\"").unwrap();
        assert_eq!(parsed, Specification::All);
    }

    #[test]
    fn extract_record_error_detail_from_stash() {
        let json = r#"[
            {"uuid": "a", "status": "Error", "stash": {"error": "disk full"}},
            {"uuid": "b", "status": "Error", "stash": {"error": {"code": 7}}},
            {"uuid": "c", "status": "Queued", "created": "2023-01-01"}
        ]"#;
        let records: Vec<ExtractRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].error_detail().as_deref(), Some("disk full"));
        assert_eq!(records[1].error_detail().as_deref(), Some(r#"{"code":7}"#));
        assert_eq!(records[2].error_detail(), None);
    }

    #[test]
    fn listing_tolerates_null_fields_in_entries() {
        let json = r#"[
            {"uuid": "a", "status": "Processing"},
            {"uuid": "other", "status": null, "stash": null},
            {"uuid": null, "status": "Queued"},
            {"status": "Completed"}
        ]"#;
        let records: Vec<ExtractRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].status, None);
        assert_eq!(records[2].uuid, "");
        assert_eq!(records[3].uuid, "");
    }

    #[test]
    fn upload_record_job_status() {
        let json = r#"[
            {"uuid": "u-1", "status": "Processing"},
            {"uuid": "u-2", "status": null},
            {"uuid": "u-3", "status": "stalled"}
        ]"#;
        let records: Vec<UploadRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].job_status(), Some(JobStatus::Processing));
        assert_eq!(records[1].job_status(), None);
        assert_eq!(records[2].job_status(), None);
    }

    #[test]
    fn current_user_error_key() {
        let user: CurrentUser = serde_json::from_str(r#"{"error": "unauthorised"}"#).unwrap();
        assert!(user.error.is_some());
        assert!(user.username.is_none());
    }
}
