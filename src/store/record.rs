//! Cloud-record store: tasks kept as schemaless records in a managed
//! datastore, keyed by an opaque record name with the task id stored as an
//! indexed field. Fetch-all paginates via cursors until exhausted.

use super::{TaskStore, sort_newest_first};
use crate::error::{StoreError, StoreResult};
use crate::types::{Quadrant, Task};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// A datastore record holding one task.
///
/// `record_name` is the datastore's primary key and is never the task id;
/// the task id lives in the `id` field like every other task attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub record_name: String,
    pub fields: serde_json::Map<String, Value>,
}

impl TaskRecord {
    pub fn from_task(record_name: String, task: &Task) -> StoreResult<Self> {
        let fields = match serde_json::to_value(task)? {
            Value::Object(map) => map,
            _ => unreachable!("Task serializes to an object"),
        };
        Ok(Self {
            record_name,
            fields,
        })
    }

    pub fn to_task(&self) -> StoreResult<Task> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    /// The task id field, when present and well-formed.
    pub fn task_id(&self) -> Option<Uuid> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Server-side predicate for record queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    TaskId(Uuid),
    Quadrant(Quadrant),
    TagsAny(BTreeSet<String>),
    ChangedSince(i64),
}

/// One page of query results. `cursor` is `Some` while more pages remain.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<TaskRecord>,
    pub cursor: Option<String>,
}

/// Capability offered by the managed datastore.
#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn query(&self, filter: &RecordFilter, cursor: Option<&str>) -> StoreResult<RecordPage>;

    /// Insert or overwrite the record with this record name.
    async fn save(&self, record: TaskRecord) -> StoreResult<()>;

    async fn delete(&self, record_name: &str) -> StoreResult<()>;
}

/// Task store over a [`RecordClient`].
pub struct RecordStore {
    client: Arc<dyn RecordClient>,
}

impl RecordStore {
    pub fn new(client: Arc<dyn RecordClient>) -> Self {
        Self { client }
    }

    /// Run a query to exhaustion, concatenating pages in order.
    async fn query_all(&self, filter: &RecordFilter) -> StoreResult<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.client.query(filter, cursor.as_deref()).await?;
            for record in page.records {
                match record.to_task() {
                    Ok(task) => tasks.push(task),
                    Err(err) => {
                        warn!(record = %record.record_name, %err, "skipping malformed task record");
                    }
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tasks)
    }

    /// Find the record carrying the given task id.
    async fn find_record(&self, id: Uuid) -> StoreResult<Option<TaskRecord>> {
        let page = self.client.query(&RecordFilter::TaskId(id), None).await?;
        Ok(page.records.into_iter().next())
    }
}

#[async_trait]
impl TaskStore for RecordStore {
    async fn create_task(&self, task: Task) -> StoreResult<Task> {
        task.validate()?;
        if self.find_record(task.id).await?.is_some() {
            return Err(StoreError::DuplicateId(task.id));
        }
        let record_name = format!("rec-{}", Uuid::new_v4());
        self.client
            .save(TaskRecord::from_task(record_name, &task)?)
            .await?;
        Ok(task)
    }

    async fn update_task(&self, mut task: Task) -> StoreResult<Task> {
        task.validate()?;
        let existing = self
            .find_record(task.id)
            .await?
            .ok_or(StoreError::TaskNotFound(task.id))?;
        task.touch();
        self.client
            .save(TaskRecord::from_task(existing.record_name, &task)?)
            .await?;
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        let existing = self
            .find_record(id)
            .await?
            .ok_or(StoreError::TaskNotFound(id))?;
        self.client.delete(&existing.record_name).await
    }

    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>> {
        let mut tasks = self.query_all(&RecordFilter::All).await?;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        let mut tasks = self.query_all(&RecordFilter::Quadrant(quadrant)).await?;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        let mut tasks = self
            .query_all(&RecordFilter::TagsAny(tags.clone()))
            .await?;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>> {
        let mut tasks = self.query_all(&RecordFilter::ChangedSince(since_ms)).await?;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }
}
