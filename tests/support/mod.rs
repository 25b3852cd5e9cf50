#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use uuid::Uuid;

use pressroom::application::converter::{Converter, ConverterError, ConverterOutput};
use pressroom::application::repos::{ConversionJobsRepo, JobQueue, RepoError};
use pressroom::application::storage::{BlobStorage, BlobStorageError};
use pressroom::domain::jobs::{ConversionJob, StorageLocation, now_utc};
use pressroom::domain::render::ConverterInvocation;
use pressroom::domain::types::JobStatus;

/// Store keeping jobs in memory and honouring expiry like the Postgres adapter.
#[derive(Default)]
pub struct MemoryJobsRepo {
    jobs: Mutex<HashMap<Uuid, ConversionJob>>,
    persisted_statuses: Mutex<Vec<JobStatus>>,
    unhealthy: AtomicBool,
    fail_creates: AtomicBool,
    update_calls: AtomicUsize,
    failing_update: AtomicUsize,
}

impl MemoryJobsRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert without going through `create_job`, e.g. to plant corrupt records.
    pub async fn insert(&self, job: ConversionJob) {
        self.jobs.lock().await.insert(job.identifier(), job);
    }

    pub async fn get(&self, identifier: Uuid) -> Option<ConversionJob> {
        self.jobs.lock().await.get(&identifier).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Every status written through `update_job`, in order.
    pub async fn persisted_statuses(&self) -> Vec<JobStatus> {
        self.persisted_statuses.lock().await.clone()
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Make the `call`th `update_job` (1-based) fail without writing anything.
    pub fn fail_update_call(&self, call: usize) {
        self.failing_update.store(call, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversionJobsRepo for MemoryJobsRepo {
    async fn create_job(&self, job: &ConversionJob) -> Result<(), RepoError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("store unavailable"));
        }
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.identifier()) {
            return Err(RepoError::Duplicate {
                constraint: "conversion_jobs_pkey".to_string(),
            });
        }
        jobs.insert(job.identifier(), job.clone());
        Ok(())
    }

    async fn find_job(&self, identifier: &str) -> Result<Option<ConversionJob>, RepoError> {
        let identifier = Uuid::parse_str(identifier).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?;
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .get(&identifier)
            .filter(|job| job.expires_at() > now_utc())
            .cloned())
    }

    async fn update_job(&self, job: &ConversionJob) -> Result<(), RepoError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_update.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset by peer"));
        }
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&job.identifier()) {
            Some(existing) if existing.expires_at() > now_utc() => {
                *existing = job.clone();
                self.persisted_statuses.lock().await.push(job.status());
                Ok(())
            }
            _ => Err(RepoError::NotFound),
        }
    }

    async fn purge_expired(&self) -> Result<u64, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        let now = now_utc();
        jobs.retain(|_, job| job.expires_at() > now);
        Ok((before - jobs.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Queue that records pushed payloads.
#[derive(Default)]
pub struct MemoryJobQueue {
    pushed: Mutex<Vec<serde_json::Value>>,
    fail: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn pushed(&self) -> Vec<serde_json::Value> {
        self.pushed.lock().await.clone()
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, payload: serde_json::Value) -> Result<String, RepoError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("queue unavailable"));
        }
        let mut pushed = self.pushed.lock().await;
        pushed.push(payload);
        Ok(pushed.len().to_string())
    }
}

#[derive(Debug, Clone)]
pub enum ConverterScript {
    /// Write the output file and report success.
    Succeed { transcript: String },
    /// Exit non-zero without writing output.
    Fail { transcript: String, exit_code: i32 },
    /// Write a partial output file, then panic.
    Crash,
}

/// Converter double that follows a script and records what it was asked to do.
pub struct ScriptedConverter {
    script: ConverterScript,
    invocations: Mutex<Vec<ConverterInvocation>>,
}

impl ScriptedConverter {
    pub fn succeeding(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            script: ConverterScript::Succeed {
                transcript: transcript.to_string(),
            },
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(transcript: &str, exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            script: ConverterScript::Fail {
                transcript: transcript.to_string(),
                exit_code,
            },
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn crashing() -> Arc<Self> {
        Arc::new(Self {
            script: ConverterScript::Crash,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub async fn invocations(&self) -> Vec<ConverterInvocation> {
        self.invocations.lock().await.clone()
    }

    /// Output paths of every run, whose parents are the scratch directories used.
    pub async fn output_paths(&self) -> Vec<PathBuf> {
        self.invocations
            .lock()
            .await
            .iter()
            .map(|invocation| invocation.output_path.clone())
            .collect()
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    async fn run(&self, invocation: &ConverterInvocation) -> ConverterOutput {
        self.invocations.lock().await.push(invocation.clone());

        match &self.script {
            ConverterScript::Succeed { transcript } => {
                let written = tokio::fs::write(&invocation.output_path, b"artifact").await;
                ConverterOutput {
                    transcript: transcript.clone(),
                    result: written.map_err(|source| ConverterError::Spawn {
                        program: invocation.program.as_str().to_string(),
                        source,
                    }),
                }
            }
            ConverterScript::Fail {
                transcript,
                exit_code,
            } => ConverterOutput {
                transcript: transcript.clone(),
                result: Err(ConverterError::Exit {
                    program: invocation.program.as_str().to_string(),
                    exit_code: Some(*exit_code),
                }),
            },
            ConverterScript::Crash => {
                tokio::fs::write(&invocation.output_path, b"%PDF-1.4 partial")
                    .await
                    .expect("partial artifact");
                panic!("converter crashed mid-render");
            }
        }
    }
}

/// Blob storage keeping objects in memory with an optional artificial upload delay.
#[derive(Default)]
pub struct MemoryBlobStorage {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    upload_delay: Option<Duration>,
    fail_presign: AtomicBool,
}

impl MemoryBlobStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            upload_delay: Some(delay),
            ..Self::default()
        })
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub fn fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), BlobStorageError> {
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn presign_get(
        &self,
        location: &StorageLocation,
        expires_in: Duration,
    ) -> Result<String, BlobStorageError> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(BlobStorageError::Presign {
                key: location.key.clone(),
                message: "signing credentials unavailable".to_string(),
            });
        }
        Ok(format!(
            "https://{}.s3.{}.storage.test/{}?X-Amz-Expires={}",
            location.bucket,
            location.region,
            location.key,
            expires_in.as_secs()
        ))
    }
}
