//! Storage backends for task records.
//!
//! Every backend satisfies the same [`TaskStore`] contract, so the sync
//! coordinator and the UI layer stay backend-agnostic; swapping one for
//! another changes latency and failure modes, never visible behavior.

pub mod memory;
pub mod record;
pub mod rest;

pub use memory::MemoryStore;
pub use record::{RecordClient, RecordFilter, RecordPage, RecordStore, TaskRecord};
pub use rest::{RestStore, TokenProvider};

use crate::error::StoreResult;
use crate::types::{Quadrant, Task};
use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Common persistence contract for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `DuplicateId` when the id already
    /// exists; never overwrites implicitly.
    async fn create_task(&self, task: Task) -> StoreResult<Task>;

    /// Fully replace the stored record and refresh `updated_at`.
    /// Fails with `TaskNotFound` when the id is absent.
    async fn update_task(&self, task: Task) -> StoreResult<Task>;

    /// Remove the record permanently. Fails with `TaskNotFound` when absent.
    async fn delete_task(&self, id: Uuid) -> StoreResult<()>;

    /// All tasks, newest first by `created_at`.
    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Tasks in the given quadrant, newest first.
    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>>;

    /// Tasks whose tag set intersects `tags`, newest first.
    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>>;

    /// Tasks with `updated_at > since_ms`, newest first.
    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>>;

    /// Single-task lookup. Backends with keyed access override this.
    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.fetch_tasks().await?.into_iter().find(|t| t.id == id))
    }
}

/// Sort newest-first by `created_at`, ties broken by id for a stable order.
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
