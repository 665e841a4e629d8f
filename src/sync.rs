//! Reconciliation between the local cache, the change queue, and a remote
//! store.
//!
//! One pass pushes pending changes in FIFO order, pulls the remote snapshot
//! over the local cache (last-writer-wins), re-applies whatever the remote has
//! not yet acknowledged, and records the high-water mark. At most one pass is
//! in flight; a trigger arriving mid-pass schedules a single rerun instead of
//! queuing.

use crate::error::{StoreError, StoreResult};
use crate::queue::ChangeQueue;
use crate::store::{MemoryStore, TaskStore};
use crate::types::{Change, ChangeOp, now_ms};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a sync pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Periodic timer fired.
    Interval,
    /// Network came back.
    Online,
    /// A local mutation was just enqueued.
    LocalChange,
}

/// Counters from one completed pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entries pushed and acknowledged.
    pub pushed: usize,
    /// Entries that failed and remain queued.
    pub failed: usize,
    /// Tasks pulled into the local cache.
    pub pulled: usize,
    pub completed_at: i64,
}

/// Result of a sync request.
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// The pass aborted; pending entries stay queued for the next trigger.
    Failed(StoreError),
    /// A pass was already in flight; no network calls were made.
    AlreadySyncing,
}

/// Drives reconciliation between the change queue and the remote store.
pub struct SyncCoordinator {
    local: Arc<MemoryStore>,
    remote: Arc<dyn TaskStore>,
    queue: ChangeQueue,
    pass_guard: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(local: Arc<MemoryStore>, remote: Arc<dyn TaskStore>, queue: ChangeQueue) -> Self {
        Self {
            local,
            remote,
            queue,
            pass_guard: tokio::sync::Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    pub fn local(&self) -> &Arc<MemoryStore> {
        &self.local
    }

    /// Run a sync pass now, unless one is already in flight.
    ///
    /// A request that lands mid-pass marks a rerun; the in-flight caller runs
    /// one more pass after its own completes, so the late trigger's intent is
    /// not lost.
    pub async fn request_sync(&self) -> SyncOutcome {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            self.rerun.store(true, Ordering::SeqCst);
            return SyncOutcome::AlreadySyncing;
        };

        loop {
            let outcome = match self.run_pass().await {
                Ok(report) => {
                    debug!(
                        pushed = report.pushed,
                        failed = report.failed,
                        pulled = report.pulled,
                        "sync pass completed"
                    );
                    SyncOutcome::Completed(report)
                }
                Err(err) => {
                    warn!(%err, "sync pass failed; entries retained for next trigger");
                    SyncOutcome::Failed(err)
                }
            };
            if !self.rerun.swap(false, Ordering::SeqCst) {
                return outcome;
            }
        }
    }

    /// One push-then-pull reconciliation cycle.
    async fn run_pass(&self) -> StoreResult<SyncReport> {
        let entries = self.queue.drain()?;
        let mut pushed = 0;
        let mut failed = 0;

        for entry in &entries {
            match self.push_change(&entry.change).await {
                Ok(()) => {
                    self.queue.acknowledge(&[entry.id])?;
                    pushed += 1;
                }
                Err(err) => {
                    // Partial failure: keep the entry in place, keep going.
                    warn!(entry = entry.id, op = entry.change.op.as_str(), %err,
                          "push failed; entry retained for retry");
                    failed += 1;
                }
            }
        }

        // Whatever the remote holds now wins over the local cache, except for
        // changes the remote has not acknowledged yet.
        let snapshot = self.remote.fetch_tasks().await?;
        let pulled = snapshot.len();
        self.local.replace_all(snapshot);
        for entry in self.queue.drain()? {
            self.local.apply_change(&entry.change);
        }

        let completed_at = now_ms();
        self.queue.set_last_sync_time(completed_at)?;

        Ok(SyncReport {
            pushed,
            failed,
            pulled,
            completed_at,
        })
    }

    /// Push one change, absorbing retry-induced conflicts so that replaying
    /// an already-applied entry succeeds.
    async fn push_change(&self, change: &Change) -> StoreResult<()> {
        match change.op {
            ChangeOp::Create => {
                let task = change
                    .task
                    .clone()
                    .ok_or_else(|| StoreError::Validation("create change without task".into()))?;
                match self.remote.create_task(task.clone()).await {
                    Err(StoreError::DuplicateId(_)) => {
                        self.remote.update_task(task).await.map(|_| ())
                    }
                    other => other.map(|_| ()),
                }
            }
            ChangeOp::Update => {
                let task = change
                    .task
                    .clone()
                    .ok_or_else(|| StoreError::Validation("update change without task".into()))?;
                match self.remote.update_task(task.clone()).await {
                    Err(StoreError::TaskNotFound(_)) => {
                        self.remote.create_task(task).await.map(|_| ())
                    }
                    other => other.map(|_| ()),
                }
            }
            ChangeOp::Delete => match self.remote.delete_task(change.task_id).await {
                // Already gone remotely; the intent is satisfied.
                Err(StoreError::TaskNotFound(_)) => Ok(()),
                other => other,
            },
        }
    }

    /// Consume triggers until the channel closes.
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<SyncTrigger>) {
        info!("sync coordinator started");
        while let Some(trigger) = triggers.recv().await {
            debug!(?trigger, "sync trigger received");
            self.request_sync().await;
        }
        info!("sync coordinator stopped");
    }
}

/// Feed `SyncTrigger::Interval` into the coordinator at a fixed period.
///
/// Tests drive the coordinator by sending triggers directly instead of
/// depending on real timers.
pub fn interval_ticker(period: Duration, tx: mpsc::Sender<SyncTrigger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(SyncTrigger::Interval).await.is_err() {
                break;
            }
        }
    })
}
