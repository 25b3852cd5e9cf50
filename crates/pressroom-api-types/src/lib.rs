//! Wire types shared by the pressroom server and its clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Output family requested through `POST /render/{target}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTarget {
    Image,
    Pdf,
}

impl RenderTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderTarget::Image => "image",
            RenderTarget::Pdf => "pdf",
        }
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRenderTarget(pub String);

impl fmt::Display for UnknownRenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown render target `{}`", self.0)
    }
}

impl std::error::Error for UnknownRenderTarget {}

impl FromStr for RenderTarget {
    type Err = UnknownRenderTarget;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "image" => Ok(RenderTarget::Image),
            "pdf" => Ok(RenderTarget::Pdf),
            other => Err(UnknownRenderTarget(other.to_string())),
        }
    }
}

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Snapshot returned by both the submission and the status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub ended_at: Option<OffsetDateTime>,
    pub expires_in: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub uuid: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn render_target_parses_known_values_only() {
        assert_eq!("pdf".parse::<RenderTarget>(), Ok(RenderTarget::Pdf));
        assert_eq!("image".parse::<RenderTarget>(), Ok(RenderTarget::Image));
        assert_eq!(
            "video".parse::<RenderTarget>(),
            Err(UnknownRenderTarget("video".to_string()))
        );
    }

    #[test]
    fn pending_snapshot_omits_file_url_and_nulls_timestamps() {
        let response = RenderResponse {
            uuid: "6a1f6a4e-3c1b-4f43-9df2-1c1f0f7c2b9a".to_string(),
            created_at: datetime!(2024-03-01 10:00:00 UTC),
            started_at: None,
            ended_at: None,
            expires_in: 86400,
            file_url: None,
            status: JobStatus::Pending,
            logs: Vec::new(),
        };

        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["created_at"], "2024-03-01T10:00:00Z");
        assert!(value["started_at"].is_null());
        assert!(value.get("file_url").is_none());
        assert_eq!(value["logs"], serde_json::json!([]));
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
