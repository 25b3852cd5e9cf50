use std::convert::TryFrom;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ConversionJobsRepo, RepoError},
    domain::{
        jobs::{ConversionJob, ConversionJobParts, StorageLocation},
        types::JobStatus,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ConversionJobRow {
    identifier: Uuid,
    created_at: OffsetDateTime,
    started_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
    expires_in: i32,
    status: String,
    logs: String,
    storage_region: Option<String>,
    storage_bucket: Option<String>,
    storage_key: Option<String>,
    request_type: String,
    request_data: Vec<u8>,
}

impl TryFrom<ConversionJobRow> for ConversionJob {
    type Error = RepoError;

    fn try_from(row: ConversionJobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::try_from(row.status.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job status `{}`", row.status))
        })?;
        let expires_in = u32::try_from(row.expires_in).map_err(|_| {
            RepoError::from_persistence(format!("negative expiry `{}`", row.expires_in))
        })?;

        let storage = match (row.storage_region, row.storage_bucket, row.storage_key) {
            (Some(region), Some(bucket), Some(key)) => Some(StorageLocation {
                region,
                bucket,
                key,
            }),
            _ => None,
        };

        Ok(ConversionJob::from_parts(ConversionJobParts {
            identifier: row.identifier,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            expires_in,
            status,
            logs: row.logs,
            storage,
            request_type: row.request_type,
            request_data: row.request_data,
        }))
    }
}

fn expires_in_column(job: &ConversionJob) -> Result<i32, RepoError> {
    i32::try_from(job.expires_in()).map_err(|_| RepoError::InvalidInput {
        message: format!("expiry of {}s is out of range", job.expires_in()),
    })
}

#[async_trait]
impl ConversionJobsRepo for PostgresRepositories {
    async fn create_job(&self, job: &ConversionJob) -> Result<(), RepoError> {
        let storage = job.storage();

        sqlx::query(
            r#"
            INSERT INTO conversion_jobs (
                namespace, identifier, created_at, started_at, ended_at,
                expires_in, expires_at, status, logs,
                storage_region, storage_bucket, storage_key,
                request_type, request_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(self.namespace())
        .bind(job.identifier())
        .bind(job.created_at())
        .bind(job.started_at())
        .bind(job.ended_at())
        .bind(expires_in_column(job)?)
        .bind(job.expires_at())
        .bind(job.status().as_str())
        .bind(job.logs())
        .bind(storage.map(|location| location.region.as_str()))
        .bind(storage.map(|location| location.bucket.as_str()))
        .bind(storage.map(|location| location.key.as_str()))
        .bind(job.request_type())
        .bind(job.request_data())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_job(&self, identifier: &str) -> Result<Option<ConversionJob>, RepoError> {
        let identifier = Uuid::parse_str(identifier).map_err(|err| RepoError::InvalidInput {
            message: format!("`{identifier}` is not a valid job identifier: {err}"),
        })?;

        let row = sqlx::query_as::<_, ConversionJobRow>(
            r#"
            SELECT identifier,
                   created_at,
                   started_at,
                   ended_at,
                   expires_in,
                   status,
                   logs,
                   storage_region,
                   storage_bucket,
                   storage_key,
                   request_type,
                   request_data
              FROM conversion_jobs
             WHERE namespace = $1
               AND identifier = $2
               AND expires_at > now()
            "#,
        )
        .bind(self.namespace())
        .bind(identifier)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ConversionJob::try_from).transpose()
    }

    async fn update_job(&self, job: &ConversionJob) -> Result<(), RepoError> {
        let storage = job.storage();

        let result = sqlx::query(
            r#"
            UPDATE conversion_jobs
               SET started_at = $3,
                   ended_at = $4,
                   status = $5,
                   logs = $6,
                   storage_region = $7,
                   storage_bucket = $8,
                   storage_key = $9
             WHERE namespace = $1
               AND identifier = $2
               AND expires_at > now()
            "#,
        )
        .bind(self.namespace())
        .bind(job.identifier())
        .bind(job.started_at())
        .bind(job.ended_at())
        .bind(job.status().as_str())
        .bind(job.logs())
        .bind(storage.map(|location| location.region.as_str()))
        .bind(storage.map(|location| location.bucket.as_str()))
        .bind(storage.map(|location| location.key.as_str()))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM conversion_jobs
             WHERE namespace = $1
               AND expires_at <= now()
            "#,
        )
        .bind(self.namespace())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        PostgresRepositories::health_check(self)
            .await
            .map_err(map_sqlx_error)
    }
}
