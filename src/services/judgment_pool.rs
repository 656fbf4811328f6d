//! Bounded pool of background workers running judgment jobs off the request path.
//!
//! Verdicts and interim rescores travel on separate queues. Workers always take a waiting
//! verdict first, and at most one rescore per room waits in its queue at any time.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashSet;
use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dao::models::RoomId;

/// What a queued job should compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Final verdict; closes the room.
    Verdict,
    /// Interim conviction scores while the debate runs.
    Rescore,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Verdict => "verdict",
            JobKind::Rescore => "rescore",
        })
    }
}

/// Unit of work handed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgmentJob {
    /// Correlates log lines of one job.
    pub id: Uuid,
    /// Room the job works on.
    pub room_id: RoomId,
    /// What the job computes.
    pub kind: JobKind,
}

impl JudgmentJob {
    /// Final verdict job for the room.
    pub fn verdict(room_id: RoomId) -> Self {
        Self::new(room_id, JobKind::Verdict)
    }

    /// Interim scoring job for the room.
    pub fn rescore(room_id: RoomId) -> Self {
        Self::new(room_id, JobKind::Rescore)
    }

    fn new(room_id: RoomId, kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            kind,
        }
    }
}

/// Result of [`JudgmentPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The job waits for a worker.
    Queued,
    /// A rescore of the same room is already waiting; this one was folded into it.
    Coalesced,
    /// The queue was at capacity.
    DroppedFull,
    /// The pool is shutting down.
    DroppedClosed,
}

impl SubmitOutcome {
    /// Whether the job will run, either on its own or through a waiting rescore.
    pub fn is_queued(self) -> bool {
        matches!(self, SubmitOutcome::Queued | SubmitOutcome::Coalesced)
    }
}

/// Executes jobs pulled from the queue. Implementations must contain their own failures.
pub trait JobHandler: Send + Sync + 'static {
    /// Run `job` to completion.
    fn handle(&self, job: JudgmentJob) -> BoxFuture<'static, ()>;
}

struct Queues {
    verdicts: mpsc::Receiver<JudgmentJob>,
    rescores: mpsc::Receiver<JudgmentJob>,
}

/// Fixed set of workers draining a verdict queue and a rescore queue.
pub struct JudgmentPool {
    verdicts: mpsc::Sender<JudgmentJob>,
    rescores: mpsc::Sender<JudgmentJob>,
    /// Rooms with a rescore waiting in the queue.
    pending_rescores: Arc<DashSet<RoomId>>,
    closed: AtomicBool,
    stop: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JudgmentPool {
    /// Start `workers` tasks. Each queue holds at most `capacity` pending jobs.
    pub fn spawn(workers: usize, capacity: usize, handler: Arc<dyn JobHandler>) -> Self {
        let (verdicts, verdict_rx) = mpsc::channel(capacity.max(1));
        let (rescores, rescore_rx) = mpsc::channel(capacity.max(1));
        let queues = Arc::new(Mutex::new(Queues {
            verdicts: verdict_rx,
            rescores: rescore_rx,
        }));
        let pending_rescores = Arc::new(DashSet::new());
        let (stop, _) = watch::channel(false);

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    queues.clone(),
                    pending_rescores.clone(),
                    stop.subscribe(),
                    handler.clone(),
                ))
            })
            .collect();

        Self {
            verdicts,
            rescores,
            pending_rescores,
            closed: AtomicBool::new(false),
            stop,
            workers: Mutex::new(handles),
        }
    }

    /// Enqueue `job` without waiting. Jobs that do not fit are dropped and logged.
    pub fn submit(&self, job: JudgmentJob) -> SubmitOutcome {
        if self.closed.load(Ordering::Acquire) {
            warn!(job_id = %job.id, room_id = job.room_id, kind = %job.kind, "judgment pool closed; dropping job");
            return SubmitOutcome::DroppedClosed;
        }

        match job.kind {
            JobKind::Verdict => enqueue(&self.verdicts, job),
            JobKind::Rescore => {
                if !self.pending_rescores.insert(job.room_id) {
                    debug!(job_id = %job.id, room_id = job.room_id, "rescore already waiting; coalesced");
                    return SubmitOutcome::Coalesced;
                }
                let outcome = enqueue(&self.rescores, job);
                if outcome != SubmitOutcome::Queued {
                    self.pending_rescores.remove(&job.room_id);
                }
                outcome
            }
        }
    }

    /// Stop accepting jobs, let running jobs finish, and wait for every worker to exit.
    /// Jobs still waiting in the queue are discarded.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.stop.send(true);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "judgment worker terminated abnormally");
            }
        }
        info!("judgment pool stopped");
    }
}

fn enqueue(sender: &mpsc::Sender<JudgmentJob>, job: JudgmentJob) -> SubmitOutcome {
    match sender.try_send(job) {
        Ok(()) => {
            debug!(job_id = %job.id, room_id = job.room_id, kind = %job.kind, "judgment job queued");
            SubmitOutcome::Queued
        }
        Err(mpsc::error::TrySendError::Full(job)) => {
            warn!(job_id = %job.id, room_id = job.room_id, kind = %job.kind, "judgment queue full; dropping job");
            SubmitOutcome::DroppedFull
        }
        Err(mpsc::error::TrySendError::Closed(job)) => {
            warn!(job_id = %job.id, room_id = job.room_id, kind = %job.kind, "judgment workers gone; dropping job");
            SubmitOutcome::DroppedClosed
        }
    }
}

async fn run_worker(
    worker: usize,
    queues: Arc<Mutex<Queues>>,
    pending_rescores: Arc<DashSet<RoomId>>,
    mut stop: watch::Receiver<bool>,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        let job = {
            let mut guard = queues.lock().await;
            let queues = &mut *guard;
            tokio::select! {
                biased;
                _ = stop.changed() => None,
                job = queues.verdicts.recv() => job,
                job = queues.rescores.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };
        if job.kind == JobKind::Rescore {
            // Messages arriving from here on need a fresh rescore.
            pending_rescores.remove(&job.room_id);
        }

        debug!(worker, job_id = %job.id, room_id = job.room_id, kind = %job.kind, "running judgment job");
        handler.handle(job).await;
    }

    debug!(worker, "judgment worker exiting");
}
