//! Job submission and status reads
//!
//! [`ImportService`] is the surface the server and the CLI use. Submitting
//! spools the upload to disk, records a `pending` job and hands it to a
//! background task; the caller gets the job back immediately. Executors are
//! bounded by a semaphore so at most `max_concurrent_jobs` files are processed
//! at once.
//!
//! Status reads prefer the live progress channel and fall back to the job
//! repository, so a job stays observable after its channel is gone or from a
//! process that never ran it.

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::pipeline::ImportPipeline;
use crate::progress::{ProgressHub, ProgressStream};
use crate::storage::{JobRepository, ProductStore};
use crate::types::{ImportJob, JobSnapshot};
use crate::webhooks::NotificationSink;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ImportService {
    pipeline: Arc<ImportPipeline>,
    jobs: Arc<dyn JobRepository>,
    hub: ProgressHub,
    permits: Arc<Semaphore>,
}

impl ImportService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        jobs: Arc<dyn JobRepository>,
        notifier: Arc<dyn NotificationSink>,
        config: ImportConfig,
    ) -> Self {
        let hub = ProgressHub::new();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let pipeline = ImportPipeline::new(products, jobs.clone(), hub.clone(), notifier, config);

        Self {
            pipeline: Arc::new(pipeline),
            jobs,
            hub,
            permits,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        self.pipeline.config()
    }

    /// Accept an upload and start importing it in the background.
    pub async fn submit<R>(&self, source: R, filename: &str) -> Result<ImportJob>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.submit_with_handle(source, filename)
            .await
            .map(|(job, _)| job)
    }

    /// Like [`submit`](Self::submit), also returning the executor task.
    pub async fn submit_with_handle<R>(
        &self,
        source: R,
        filename: &str,
    ) -> Result<(ImportJob, JoinHandle<()>)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let job = ImportJob::new(filename);
        let path = self.spool_path(job.id);

        let bytes = match self.spool(source, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&path).await;
                return Err(e);
            },
        };

        let jobs = &self.jobs;
        if let Err(e) = self.config().retry.run("insert_job", || jobs.insert(&job)).await {
            discard(&path).await;
            return Err(e.into());
        }
        self.hub.register(job.snapshot()).await;

        info!(job_id = %job.id, filename = %job.filename, bytes, "Import job submitted");
        let handle = self.spawn(job.id, path);
        Ok((job, handle))
    }

    fn spool_path(&self, id: Uuid) -> PathBuf {
        self.config().upload_dir.join(format!("{}.csv", id))
    }

    async fn spool<R>(&self, source: R, path: &Path) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let limit = self.config().max_upload_bytes;
        tokio::fs::create_dir_all(&self.config().upload_dir).await?;
        let mut file = tokio::fs::File::create(path).await?;

        // One byte past the limit is enough to tell an oversized upload apart.
        let mut limited = source.take(limit.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| ImportError::InvalidFile(format!("upload could not be read: {}", e)))?;
        file.flush().await?;

        if written == 0 {
            return Err(ImportError::InvalidFile("uploaded file is empty".to_string()));
        }
        if written > limit {
            return Err(ImportError::FileTooLarge { limit });
        }
        Ok(written)
    }

    fn spawn(&self, job_id: Uuid, path: PathBuf) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let _permit = match service.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(%job_id, error = %e, "Executor pool closed, job left pending");
                    return;
                },
            };

            let outcome = service.pipeline.run(job_id, &path).await;
            discard(&path).await;

            match outcome {
                Ok(job) => {
                    debug!(%job_id, status = %job.status, "Executor finished");
                    service.release_channel(job_id).await;
                },
                Err(e) => {
                    // Never ran here: the channel only holds the submit snapshot.
                    error!(%job_id, error = %e, "Import job could not be run");
                    service.hub.remove(job_id).await;
                },
            }
        })
    }

    /// Drop the live channel once the repository can answer for the job.
    async fn release_channel(&self, id: Uuid) {
        match self.jobs.get(id).await {
            Ok(Some(job)) if job.status.is_terminal() => self.hub.remove(id).await,
            Ok(_) => warn!(job_id = %id, "Stored job is not terminal, keeping live progress"),
            Err(e) => warn!(job_id = %id, error = %e, "Could not read stored job, keeping live progress"),
        }
    }

    pub async fn get_status(&self, id: Uuid) -> Result<JobSnapshot> {
        if let Some(snapshot) = self.hub.snapshot(id).await {
            return Ok(snapshot);
        }
        self.jobs
            .get(id)
            .await?
            .map(JobSnapshot::from)
            .ok_or(ImportError::NotFound(id))
    }

    /// Snapshots of a job until it reaches a terminal state.
    ///
    /// The first item is always the current state. Consecutive items differ.
    pub async fn subscribe(&self, id: Uuid) -> Result<ProgressStream> {
        if let Some(stream) = self.hub.subscribe(id).await {
            return Ok(stream);
        }
        let job = self.jobs.get(id).await?.ok_or(ImportError::NotFound(id))?;
        Ok(poll_repository(self.jobs.clone(), job.snapshot(), self.config().poll_interval()))
    }

    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobSnapshot>> {
        let jobs = self.jobs.list(limit).await?;
        Ok(jobs.into_iter().map(JobSnapshot::from).collect())
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove spooled upload"),
    }
}

enum PollState {
    Emit(JobSnapshot),
    Wait(JobSnapshot),
    Done,
}

/// Follow a job through the repository when no live channel exists.
fn poll_repository(
    jobs: Arc<dyn JobRepository>,
    initial: JobSnapshot,
    interval: Duration,
) -> ProgressStream {
    stream::unfold(PollState::Emit(initial), move |state| {
        let jobs = jobs.clone();
        async move {
            let mut last = match state {
                PollState::Done => return None,
                PollState::Emit(snapshot) => {
                    let next = if snapshot.is_complete {
                        PollState::Done
                    } else {
                        PollState::Wait(snapshot.clone())
                    };
                    return Some((snapshot, next));
                },
                PollState::Wait(last) => last,
            };

            loop {
                tokio::time::sleep(interval).await;
                match jobs.get(last.id()).await {
                    Ok(Some(job)) if job != last.job => {
                        let snapshot = job.snapshot();
                        let next = if snapshot.is_complete {
                            PollState::Done
                        } else {
                            PollState::Wait(snapshot.clone())
                        };
                        return Some((snapshot, next));
                    },
                    Ok(Some(job)) => last.job = job,
                    Ok(None) => return None,
                    Err(e) => warn!(job_id = %last.id(), error = %e, "Polling import job failed"),
                }
            }
        }
    })
    .boxed()
}
