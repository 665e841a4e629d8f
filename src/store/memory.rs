//! In-memory store: the local-first cache and the reconciliation target
//! between syncs. No persistence across process restarts.

use super::{TaskStore, sort_newest_first};
use crate::error::{StoreError, StoreResult};
use crate::filter::tags_intersect;
use crate::types::{Change, ChangeOp, Quadrant, Task};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

/// Mapping from id to task behind a single mutex; every operation is atomic
/// with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot with the remote task set (pull step of a
    /// sync pass).
    pub fn replace_all(&self, tasks: Vec<Task>) {
        let mut map = self.tasks.lock().unwrap();
        map.clear();
        for task in tasks {
            map.insert(task.id, task);
        }
    }

    /// Re-apply a not-yet-acknowledged local change on top of the snapshot.
    /// Creates and updates upsert; deletes remove if present.
    pub fn apply_change(&self, change: &Change) {
        let mut map = self.tasks.lock().unwrap();
        match change.op {
            ChangeOp::Create | ChangeOp::Update => {
                if let Some(task) = &change.task {
                    map.insert(task.id, task.clone());
                }
            }
            ChangeOp::Delete => {
                map.remove(&change.task_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    fn collect<F>(&self, predicate: F) -> Vec<Task>
    where
        F: Fn(&Task) -> bool,
    {
        let map = self.tasks.lock().unwrap();
        let mut tasks: Vec<Task> = map.values().filter(|t| predicate(t)).cloned().collect();
        sort_newest_first(&mut tasks);
        tasks
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: Task) -> StoreResult<Task> {
        task.validate()?;
        let mut map = self.tasks.lock().unwrap();
        if map.contains_key(&task.id) {
            return Err(StoreError::DuplicateId(task.id));
        }
        map.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, mut task: Task) -> StoreResult<Task> {
        task.validate()?;
        let mut map = self.tasks.lock().unwrap();
        if !map.contains_key(&task.id) {
            return Err(StoreError::TaskNotFound(task.id));
        }
        task.touch();
        map.insert(task.id, task.clone());
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        let mut map = self.tasks.lock().unwrap();
        if map.remove(&id).is_none() {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.collect(|_| true))
    }

    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        Ok(self.collect(|t| t.quadrant == quadrant))
    }

    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        Ok(self.collect(|t| tags_intersect(&t.tags, tags)))
    }

    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>> {
        Ok(self.collect(|t| t.updated_at > since_ms))
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.get(id))
    }
}
