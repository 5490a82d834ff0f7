// src/space/executor.rs — Per-space concurrency policy
//
// The dispatcher only sees `ExecutionPolicy::submit`. The default policy is a
// bounded tokio worker pool: `workers` jobs run at once, up to `queue` more
// wait for a slot, anything beyond that is rejected. Each job is abortable
// (cooperative interruption by id) and bounded by the pool timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::infra::config::ExecutorConfig;
use crate::infra::errors::ExecutionError;

/// How the submitter waits for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wait for the job to finish or for the policy to give up on it.
    Sync,
    /// Return once the job is accepted. The job owns the response from then on.
    /// A job that is interrupted or times out leaves the response unwritten.
    Async,
}

/// A unit of work.
pub struct Job {
    id: String,
    label: String,
    work: BoxFuture<'static, anyhow::Result<()>>,
}

impl Job {
    pub fn new<F>(id: &str, label: &str, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            work: work.boxed(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A job known to the policy, queued or running.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub id: String,
    pub label: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ExecutionPolicy: Send + Sync {
    async fn submit(&self, job: Job, mode: Mode) -> Result<(), ExecutionError>;

    /// Ask the job with this id to stop. Returns false if no such job.
    fn interrupt(&self, id: &str) -> bool;

    /// Stop accepting work, let running jobs drain for a grace period, then
    /// abort the rest.
    async fn shutdown(&self);

    fn describe(&self) -> Vec<WorkerInfo>;
}

struct ActiveJob {
    label: String,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    abort: AbortHandle,
}

pub struct WorkerPool {
    name: String,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    active: Arc<DashMap<String, ActiveJob>>,
    drained: Arc<Notify>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(name: &str, config: ExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            name: name.to_string(),
            permits: Arc::new(Semaphore::new(workers)),
            pending: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(DashMap::new()),
            drained: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn capacity(&self) -> usize {
        self.config.workers.max(1) + self.config.queue
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

/// Releases a pool slot and forgets the job however it ends.
struct Slot {
    id: String,
    pending: Arc<AtomicUsize>,
    active: Arc<DashMap<String, ActiveJob>>,
    drained: Arc<Notify>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.active.remove(&self.id);
        if self.active.is_empty() {
            self.drained.notify_waiters();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[async_trait]
impl ExecutionPolicy for WorkerPool {
    async fn submit(&self, job: Job, mode: Mode) -> Result<(), ExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutionError::Rejected(format!("pool {} is shut down", self.name)));
        }
        let queued = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if queued > self.capacity() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ExecutionError::Rejected(format!(
                "pool {} is full ({} jobs)",
                self.name,
                self.capacity()
            )));
        }

        let Job { id, label, work } = job;
        let (abort, registration) = AbortHandle::new_pair();
        self.active.insert(
            id.clone(),
            ActiveJob {
                label,
                submitted_at: Utc::now(),
                started_at: None,
                abort,
            },
        );

        let slot = Slot {
            id: id.clone(),
            pending: self.pending.clone(),
            active: self.active.clone(),
            drained: self.drained.clone(),
        };
        let permits = self.permits.clone();
        let active = self.active.clone();
        let after = self.timeout();
        let job_id = id.clone();
        let cancelled_id = id.clone();

        let run = async move {
            let _slot = slot;
            let guarded = Abortable::new(
                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| ExecutionError::Rejected("pool closed".into()))?;
                    if let Some(mut entry) = active.get_mut(&job_id) {
                        entry.started_at = Some(Utc::now());
                    }
                    match AssertUnwindSafe(work).catch_unwind().await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(ExecutionError::Failed(format!("{e:#}"))),
                        Err(panic) => Err(ExecutionError::Failed(panic_message(panic.as_ref()))),
                    }
                },
                registration,
            );
            match tokio::time::timeout(after, guarded).await {
                Err(_) => Err(ExecutionError::TimedOut { after }),
                Ok(Err(_aborted)) => Err(ExecutionError::Cancelled(format!(
                    "job {cancelled_id} interrupted"
                ))),
                Ok(Ok(outcome)) => outcome,
            }
        };

        match mode {
            Mode::Sync => tokio::spawn(run)
                .await
                .unwrap_or_else(|e| Err(ExecutionError::Failed(e.to_string()))),
            Mode::Async => {
                let pool = self.name.clone();
                tokio::spawn(async move {
                    if let Err(e) = run.await {
                        tracing::error!("Async job {id} in pool {pool} failed: {e}");
                    }
                });
                Ok(())
            }
        }
    }

    fn interrupt(&self, id: &str) -> bool {
        match self.active.get(id) {
            Some(entry) => {
                tracing::debug!("Interrupting job {id} in pool {}", self.name);
                entry.abort.abort();
                true
            }
            None => false,
        }
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.await_termination_ms);
        let drain = async {
            loop {
                let mut notified = std::pin::pin!(self.drained.notified());
                notified.as_mut().enable();
                if self.active.is_empty() {
                    break;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout_at(deadline, drain).await;
        let leftover = self.active.len();
        if leftover > 0 {
            tracing::warn!("Pool {} aborting {leftover} unfinished job(s)", self.name);
            for entry in self.active.iter() {
                entry.abort.abort();
            }
        }
        self.permits.close();
        tracing::info!("Pool {} shut down", self.name);
    }

    fn describe(&self) -> Vec<WorkerInfo> {
        let mut jobs: Vec<WorkerInfo> = self
            .active
            .iter()
            .map(|e| WorkerInfo {
                id: e.key().clone(),
                label: e.label.clone(),
                submitted_at: e.submitted_at,
                started_at: e.started_at,
            })
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }
}
