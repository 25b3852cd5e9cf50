use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::application::repos::{JobQueue, RepoError};

use super::map_sqlx_error;

/// Producer side of an apalis Postgres queue.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    job_type: String,
    max_attempts: i32,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, job_type: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            pool,
            job_type: job_type.into(),
            max_attempts,
        }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn push(&self, payload: serde_json::Value) -> Result<String, RepoError> {
        let id: String = sqlx::query_scalar(
            r#"
            SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id
            "#,
        )
        .bind(self.job_type.as_str())
        .bind(payload)
        .bind("Pending")
        .bind(OffsetDateTime::now_utc())
        .bind(self.max_attempts)
        .bind(0_i32)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }
}
