use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::repos::{JobQueue, RepoError};

/// Queue message announcing a job that is ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertJobPayload {
    pub uuid: String,
}

/// Queue name shared by the API (producer) and workers (consumers).
pub fn convert_queue_name(namespace: &str) -> String {
    format!("{namespace}::convert")
}

/// Enqueue a job with the provided payload, returning the queue-assigned id.
pub async fn enqueue_job<Q, P>(queue: &Q, payload: &P) -> Result<String, RepoError>
where
    Q: JobQueue + ?Sized,
    P: Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    queue.push(payload).await
}

pub async fn enqueue_convert_job<Q: JobQueue + ?Sized>(
    queue: &Q,
    identifier: Uuid,
) -> Result<String, RepoError> {
    let payload = ConvertJobPayload {
        uuid: identifier.to_string(),
    };
    enqueue_job(queue, &payload).await
}
