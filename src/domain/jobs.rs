//! Conversion job aggregate and its lifecycle state machine.

use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    render::RenderRequest,
    types::{JobStatus, RenderTarget},
};

/// Where an uploaded artifact lives in blob storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

/// Every persisted field of a job, used by stores to rebuild the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJobParts {
    pub identifier: Uuid,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub ended_at: Option<OffsetDateTime>,
    pub expires_in: u32,
    pub status: JobStatus,
    pub logs: String,
    pub storage: Option<StorageLocation>,
    pub request_type: String,
    pub request_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    identifier: Uuid,
    created_at: OffsetDateTime,
    started_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
    expires_in: u32,
    status: JobStatus,
    logs: String,
    storage: Option<StorageLocation>,
    request_type: String,
    request_data: Vec<u8>,
}

/// Current UTC time truncated to whole seconds.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

impl ConversionJob {
    /// Build a new pending job carrying the serialized request.
    pub fn create(
        identifier: Uuid,
        request: &RenderRequest,
        expires_in: u32,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        let (target, data) = request.encode().map_err(DomainError::Encoding)?;

        Ok(Self {
            identifier,
            created_at: now,
            started_at: None,
            ended_at: None,
            expires_in,
            status: JobStatus::Pending,
            logs: String::new(),
            storage: None,
            request_type: target.as_str().to_string(),
            request_data: data,
        })
    }

    pub fn from_parts(parts: ConversionJobParts) -> Self {
        let ConversionJobParts {
            identifier,
            created_at,
            started_at,
            ended_at,
            expires_in,
            status,
            logs,
            storage,
            request_type,
            request_data,
        } = parts;

        Self {
            identifier,
            created_at,
            started_at,
            ended_at,
            expires_in,
            status,
            logs,
            storage,
            request_type,
            request_data,
        }
    }

    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.ended_at
    }

    pub fn expires_in(&self) -> u32 {
        self.expires_in
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(i64::from(self.expires_in))
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn logs(&self) -> &str {
        &self.logs
    }

    pub fn storage(&self) -> Option<&StorageLocation> {
        self.storage.as_ref()
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn request_data(&self) -> &[u8] {
        &self.request_data
    }

    /// Discriminator as a known target, if it is one.
    pub fn render_target(&self) -> Option<RenderTarget> {
        self.request_type.parse().ok()
    }

    /// Move to `processing`. A job redelivered while still `processing` is re-stamped.
    pub fn mark_processing(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending | JobStatus::Processing => {
                self.started_at = Some(now);
                self.status = JobStatus::Processing;
                info!(
                    target = "domain::jobs",
                    uuid = %self.identifier,
                    "Marked conversion job as 'processing'"
                );
                Ok(())
            }
            terminal => Err(self.rejected_transition(terminal, JobStatus::Processing)),
        }
    }

    pub fn mark_failed(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.finish(JobStatus::Failed, now)
    }

    pub fn mark_succeeded(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.finish(JobStatus::Succeeded, now)
    }

    /// Store the converter transcript, dropping trailing line terminators.
    pub fn record_logs(&mut self, transcript: &str) {
        self.logs = transcript.trim_end_matches(['\r', '\n']).to_string();
    }

    pub fn record_storage(&mut self, location: StorageLocation) {
        self.storage = Some(location);
    }

    fn finish(&mut self, status: JobStatus, now: OffsetDateTime) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.rejected_transition(self.status, status));
        }

        self.ended_at = Some(now);
        self.status = status;
        info!(
            target = "domain::jobs",
            uuid = %self.identifier,
            status = status.as_str(),
            "Marked conversion job as '{}'",
            status.as_str()
        );
        Ok(())
    }

    fn rejected_transition(&self, from: JobStatus, to: JobStatus) -> DomainError {
        DomainError::InvalidTransition {
            uuid: self.identifier,
            from,
            to,
        }
    }
}
