//! Cron job deleting conversion records whose retention window has passed.

use std::str::FromStr;

use apalis::prelude::*;
use cron::Schedule;

use super::context::PurgeContext;

/// Marker struct for the cron-triggered purge.
#[derive(Default, Debug, Clone)]
pub struct PurgeExpiredJob;

impl From<chrono::DateTime<chrono::Utc>> for PurgeExpiredJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_purge_expired_job(
    _job: PurgeExpiredJob,
    ctx: Data<PurgeContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.jobs.purge_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(
                target = "application::jobs::purge_expired",
                purged = count,
                "Purged expired conversion jobs"
            );
        }
        Err(err) => {
            tracing::warn!(
                target = "application::jobs::purge_expired",
                error = %err,
                "Failed to purge expired conversion jobs"
            );
        }
        _ => {}
    }
    Ok(())
}

/// Every hour at minute 0.
pub fn purge_expired_schedule() -> Result<Schedule, cron::error::Error> {
    Schedule::from_str("0 0 * * * *")
}
