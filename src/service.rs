//! UI-facing task operations over the local cache.
//!
//! `TaskService` is the context object handed to every collaborator that
//! needs task access: one instance per process, constructed at startup and
//! passed by reference. Each local mutation validates, writes the cache,
//! appends to the change queue, and nudges the sync coordinator.

use crate::error::{StoreError, StoreResult};
use crate::filter::TaskFilter;
use crate::queue::ChangeQueue;
use crate::store::{MemoryStore, TaskStore};
use crate::sync::SyncTrigger;
use crate::types::{Change, Quadrant, Task, TaskCreate, TaskPatch};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Local-first task API.
pub struct TaskService {
    local: Arc<MemoryStore>,
    queue: ChangeQueue,
    sync_tx: Option<mpsc::Sender<SyncTrigger>>,
}

impl TaskService {
    pub fn new(local: Arc<MemoryStore>, queue: ChangeQueue) -> Self {
        Self {
            local,
            queue,
            sync_tx: None,
        }
    }

    /// Wire up the coordinator's trigger channel so local changes request a
    /// sync pass.
    pub fn with_sync_channel(mut self, tx: mpsc::Sender<SyncTrigger>) -> Self {
        self.sync_tx = Some(tx);
        self
    }

    pub fn local(&self) -> &Arc<MemoryStore> {
        &self.local
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    /// Create a task locally and enqueue the change for sync.
    pub async fn create_task(&self, input: TaskCreate) -> StoreResult<Task> {
        let task = input.into_task()?;
        let created = self.local.create_task(task).await?;
        self.queue.append(Change::create(created.clone()))?;
        self.nudge();
        Ok(created)
    }

    /// Apply a patch to a cached task and enqueue the update.
    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> StoreResult<Task> {
        let mut task = self.local.get(id).ok_or(StoreError::TaskNotFound(id))?;
        patch.apply_to(&mut task);
        let updated = self.local.update_task(task).await?;
        self.queue.append(Change::update(updated.clone()))?;
        self.nudge();
        Ok(updated)
    }

    /// Move a task to another quadrant.
    pub async fn move_to_quadrant(&self, id: Uuid, quadrant: Quadrant) -> StoreResult<Task> {
        self.update_task(
            id,
            TaskPatch {
                quadrant: Some(quadrant),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a task locally and enqueue the deletion.
    pub async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        self.local.delete_task(id).await?;
        self.queue.append(Change::delete(id))?;
        self.nudge();
        Ok(())
    }

    pub async fn tasks(&self) -> StoreResult<Vec<Task>> {
        self.local.fetch_tasks().await
    }

    pub async fn tasks_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        self.local.fetch_in_quadrant(quadrant).await
    }

    pub async fn tasks_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        self.local.fetch_with_tags(tags).await
    }

    /// All cached tasks passing the filter, newest first.
    pub async fn tasks_matching(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let tasks = self.local.fetch_tasks().await?;
        Ok(filter.apply(&tasks))
    }

    fn nudge(&self) {
        if let Some(tx) = &self.sync_tx {
            // Dropping the nudge is fine; the interval trigger catches up.
            let _ = tx.try_send(SyncTrigger::LocalChange);
        }
    }
}
