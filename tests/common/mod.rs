//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use quadrant_sync::error::{StoreError, StoreResult};
use quadrant_sync::filter::tags_intersect;
use quadrant_sync::store::{
    MemoryStore, RecordClient, RecordFilter, RecordPage, TaskRecord, TaskStore,
};
use quadrant_sync::types::{Quadrant, Task, TaskCreate};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

/// A valid task with the given title and quadrant.
pub fn task(title: &str, quadrant: Quadrant) -> Task {
    Task::new(title, quadrant).expect("valid task")
}

/// A task with explicit creation time, for ordering assertions.
pub fn task_at(title: &str, quadrant: Quadrant, created_at: i64) -> Task {
    let mut t = task(title, quadrant);
    t.created_at = created_at;
    t.updated_at = created_at;
    t
}

/// A tagged task.
pub fn tagged_task(title: &str, quadrant: Quadrant, tags: &[&str]) -> Task {
    let mut t = task(title, quadrant);
    t.tags = tags.iter().map(|s| s.to_string()).collect();
    t
}

pub fn create_input(title: &str, quadrant: Quadrant) -> TaskCreate {
    TaskCreate {
        id: None,
        title: title.into(),
        description: String::new(),
        quadrant,
        due_date: None,
        priority: Default::default(),
        tags: Default::default(),
        is_completed: false,
        created_at: None,
        updated_at: None,
    }
}

/// In-memory record datastore with a configurable page size, standing in for
/// the managed cloud datastore.
pub struct FakeRecordClient {
    records: Mutex<Vec<TaskRecord>>,
    page_size: usize,
}

impl FakeRecordClient {
    pub fn new(page_size: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            page_size,
        }
    }

    fn matches(filter: &RecordFilter, record: &TaskRecord) -> bool {
        let Ok(task) = record.to_task() else {
            return false;
        };
        match filter {
            RecordFilter::All => true,
            RecordFilter::TaskId(id) => task.id == *id,
            RecordFilter::Quadrant(q) => task.quadrant == *q,
            RecordFilter::TagsAny(tags) => tags_intersect(&task.tags, tags),
            RecordFilter::ChangedSince(ms) => task.updated_at > *ms,
        }
    }
}

#[async_trait]
impl RecordClient for FakeRecordClient {
    async fn query(&self, filter: &RecordFilter, cursor: Option<&str>) -> StoreResult<RecordPage> {
        let records = self.records.lock().unwrap();
        let matching: Vec<TaskRecord> = records
            .iter()
            .filter(|r| Self::matches(filter, r))
            .cloned()
            .collect();
        let offset: usize = cursor.map(|c| c.parse().unwrap_or(0)).unwrap_or(0);
        let page: Vec<TaskRecord> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next = offset + page.len();
        let cursor = (next < matching.len()).then(|| next.to_string());
        Ok(RecordPage {
            records: page,
            cursor,
        })
    }

    async fn save(&self, record: TaskRecord) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.record_name != record.record_name);
        records.push(record);
        Ok(())
    }

    async fn delete(&self, record_name: &str) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.record_name != record_name);
        Ok(())
    }
}

/// Remote store with injectable failures: a global offline switch plus a set
/// of task ids whose mutations fail.
pub struct FaultStore {
    pub inner: MemoryStore,
    offline: AtomicBool,
    failing: Mutex<BTreeSet<Uuid>>,
}

impl FaultStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            offline: AtomicBool::new(false),
            failing: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_mutations_for(&self, id: Uuid) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn heal(&self, id: Uuid) {
        self.failing.lock().unwrap().remove(&id);
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn check_mutable(&self, id: Uuid) -> StoreResult<()> {
        self.check_reachable()?;
        if self.failing.lock().unwrap().contains(&id) {
            return Err(StoreError::Network("request timed out".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FaultStore {
    async fn create_task(&self, task: Task) -> StoreResult<Task> {
        self.check_mutable(task.id)?;
        self.inner.create_task(task).await
    }

    async fn update_task(&self, task: Task) -> StoreResult<Task> {
        self.check_mutable(task.id)?;
        self.inner.update_task(task).await
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        self.check_mutable(id)?;
        self.inner.delete_task(id).await
    }

    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>> {
        self.check_reachable()?;
        self.inner.fetch_tasks().await
    }

    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        self.check_reachable()?;
        self.inner.fetch_in_quadrant(quadrant).await
    }

    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        self.check_reachable()?;
        self.inner.fetch_with_tags(tags).await
    }

    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>> {
        self.check_reachable()?;
        self.inner.fetch_changed_since(since_ms).await
    }
}

/// Remote store whose fetches park on a semaphore, to hold a sync pass open
/// mid-flight. Counts every network-facing call.
pub struct GatedStore {
    inner: MemoryStore,
    gate: Semaphore,
    entered_tx: mpsc::UnboundedSender<()>,
    calls: AtomicUsize,
}

impl GatedStore {
    /// Returns the store and a receiver signaled whenever a fetch starts.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: MemoryStore::new(),
                gate: Semaphore::new(0),
                entered_tx,
                calls: AtomicUsize::new(0),
            },
            entered_rx,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let `n` parked fetches proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl TaskStore for GatedStore {
    async fn create_task(&self, task: Task) -> StoreResult<Task> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_task(task).await
    }

    async fn update_task(&self, task: Task) -> StoreResult<Task> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update_task(task).await
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_task(id).await
    }

    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered_tx.send(());
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.inner.fetch_tasks().await
    }

    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_in_quadrant(quadrant).await
    }

    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_with_tags(tags).await
    }

    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_changed_since(since_ms).await
    }
}
