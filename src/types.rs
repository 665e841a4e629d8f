//! Core types for the quadrant task model.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One cell of the Eisenhower urgent/important matrix.
///
/// Wire representation is the integer 1-4 used by all existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Quadrant {
    UrgentImportant,
    UrgentNotImportant,
    NotUrgentImportant,
    NotUrgentNotImportant,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::UrgentImportant,
        Quadrant::UrgentNotImportant,
        Quadrant::NotUrgentImportant,
        Quadrant::NotUrgentNotImportant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::UrgentImportant => "Urgent & Important",
            Quadrant::UrgentNotImportant => "Urgent & Not Important",
            Quadrant::NotUrgentImportant => "Not Urgent & Important",
            Quadrant::NotUrgentNotImportant => "Not Urgent & Not Important",
        }
    }
}

impl From<Quadrant> for u8 {
    fn from(q: Quadrant) -> u8 {
        match q {
            Quadrant::UrgentImportant => 1,
            Quadrant::UrgentNotImportant => 2,
            Quadrant::NotUrgentImportant => 3,
            Quadrant::NotUrgentNotImportant => 4,
        }
    }
}

impl TryFrom<u8> for Quadrant {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self, StoreError> {
        match value {
            1 => Ok(Quadrant::UrgentImportant),
            2 => Ok(Quadrant::UrgentNotImportant),
            3 => Ok(Quadrant::NotUrgentImportant),
            4 => Ok(Quadrant::NotUrgentNotImportant),
            other => Err(StoreError::Validation(format!(
                "quadrant must be 1-4, got {other}"
            ))),
        }
    }
}

/// Task priority. Wire representation is 0/1/2 (low/medium/high).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        match p {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self, StoreError> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            other => Err(StoreError::Validation(format!(
                "priority must be 0-2, got {other}"
            ))),
        }
    }
}

/// A task record.
///
/// Identity is the `id` alone; two tasks with the same id compare equal
/// regardless of field values. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    pub quadrant: Quadrant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Create a task with defaults applied, rejecting an empty title.
    pub fn new(title: impl Into<String>, quadrant: Quadrant) -> Result<Self, StoreError> {
        let now = now_ms();
        let task = Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            is_completed: false,
            quadrant,
            due_date: None,
            priority: Priority::default(),
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        task.validate()?;
        Ok(task)
    }

    /// Check the value-level invariants.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(StoreError::Validation(
                "updatedAt must not precede createdAt".into(),
            ));
        }
        Ok(())
    }

    /// Refresh `updated_at`, keeping it monotonic with respect to `created_at`.
    pub fn touch(&mut self) {
        self.updated_at = now_ms().max(self.created_at);
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Body of `POST /tasks`. The id and timestamps are honored when the client
/// supplies them (a task created offline keeps its UUID and creation time
/// through sync); otherwise the receiving store assigns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub quadrant: Quadrant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl TaskCreate {
    /// Build the full task record, validating and applying defaults.
    pub fn into_task(self) -> Result<Task, StoreError> {
        let created_at = self.created_at.unwrap_or_else(now_ms);
        let task = Task {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            title: self.title,
            description: self.description,
            is_completed: self.is_completed,
            quadrant: self.quadrant,
            due_date: self.due_date,
            priority: self.priority,
            tags: self.tags,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        };
        task.validate()?;
        Ok(task)
    }
}

impl From<&Task> for TaskCreate {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id),
            title: task.title.clone(),
            description: task.description.clone(),
            quadrant: task.quadrant,
            due_date: task.due_date,
            priority: task.priority,
            tags: task.tags.clone(),
            is_completed: task.is_completed,
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
        }
    }
}

/// Partial update with explicit merge semantics: a present field overwrites,
/// an absent field retains the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<Quadrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl TaskPatch {
    /// A patch carrying every field of `task`, for full-replace updates.
    pub fn replace(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            quadrant: Some(task.quadrant),
            is_completed: Some(task.is_completed),
            due_date: task.due_date,
            priority: Some(task.priority),
            tags: Some(task.tags.clone()),
        }
    }

    /// Merge into `task`. Does not refresh `updated_at`; stores do that.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(quadrant) = self.quadrant {
            task.quadrant = quadrant;
        }
        if let Some(is_completed) = self.is_completed {
            task.is_completed = is_completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
    }
}

/// Kind of a pending local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Create => "create",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }

}

impl std::str::FromStr for ChangeOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "create" => Ok(ChangeOp::Create),
            "update" => Ok(ChangeOp::Update),
            "delete" => Ok(ChangeOp::Delete),
            other => Err(StoreError::Validation(format!("unknown change op: {other}"))),
        }
    }
}

/// One local mutation awaiting remote acknowledgment.
///
/// Create and update carry the full task snapshot; delete carries the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub op: ChangeOp,
    pub task_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl Change {
    pub fn create(task: Task) -> Self {
        Self {
            op: ChangeOp::Create,
            task_id: task.id,
            task: Some(task),
        }
    }

    pub fn update(task: Task) -> Self {
        Self {
            op: ChangeOp::Update,
            task_id: task.id,
            task: Some(task),
        }
    }

    pub fn delete(task_id: Uuid) -> Self {
        Self {
            op: ChangeOp::Delete,
            task_id,
            task: None,
        }
    }
}

/// A queued change with its durable position and enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub id: i64,
    #[serde(flatten)]
    pub change: Change,
    pub enqueued_at: i64,
}

/// Body of `POST /sync`: a batch of client changes plus the client's
/// high-water mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub changes: Vec<Change>,
    pub last_sync_time: i64,
}

/// Response of both sync endpoints: everything changed since the mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_applies_defaults() {
        let task = Task::new("Write report", Quadrant::UrgentImportant).unwrap();
        assert_eq!(task.title, "Write report");
        assert_eq!(task.description, "");
        assert!(!task.is_completed);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.tags.is_empty());
        assert!(task.due_date.is_none());
        assert!(task.updated_at >= task.created_at);
    }

    #[test]
    fn empty_title_is_rejected() {
        assert!(Task::new("", Quadrant::UrgentImportant).is_err());
        assert!(Task::new("   ", Quadrant::NotUrgentImportant).is_err());
    }

    #[test]
    fn quadrant_round_trips_through_wire_integers() {
        for q in Quadrant::ALL {
            let raw = u8::from(q);
            assert_eq!(Quadrant::try_from(raw).unwrap(), q);
        }
    }

    #[test]
    fn out_of_range_quadrant_fails_deserialization() {
        assert!(serde_json::from_str::<Quadrant>("5").is_err());
        assert!(serde_json::from_str::<Quadrant>("0").is_err());
        assert!(serde_json::from_str::<Priority>("3").is_err());
    }

    #[test]
    fn equality_is_by_id_only() {
        let a = Task::new("one", Quadrant::UrgentImportant).unwrap();
        let mut b = a.clone();
        b.title = "renamed".into();
        assert_eq!(a, b);

        let c = Task::new("one", Quadrant::UrgentImportant).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn patch_retains_absent_fields() {
        let mut task = Task::new("title", Quadrant::NotUrgentNotImportant).unwrap();
        task.tags.insert("work".into());

        let patch = TaskPatch {
            title: Some("new title".into()),
            is_completed: Some(true),
            ..Default::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.title, "new title");
        assert!(task.is_completed);
        assert_eq!(task.quadrant, Quadrant::NotUrgentNotImportant);
        assert!(task.tags.contains("work"));
    }

    #[test]
    fn task_json_uses_camel_case() {
        let task = Task::new("t", Quadrant::UrgentImportant).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("isCompleted").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json.get("quadrant").unwrap(), 1);
    }

    #[test]
    fn create_input_honors_client_timestamps() {
        let original = Task::new("offline", Quadrant::UrgentImportant).unwrap();
        let rebuilt = TaskCreate::from(&original).into_task().unwrap();
        assert_eq!(rebuilt.id, original.id);
        assert_eq!(rebuilt.created_at, original.created_at);
        assert_eq!(rebuilt.updated_at, original.updated_at);

        let input = TaskCreate {
            created_at: Some(100),
            updated_at: Some(50),
            ..TaskCreate::from(&original)
        };
        assert!(input.into_task().is_err());
    }

    #[test]
    fn create_input_without_timestamps_stamps_now() {
        let task = TaskCreate {
            id: None,
            title: "fresh".into(),
            description: String::new(),
            quadrant: Quadrant::UrgentImportant,
            due_date: None,
            priority: Default::default(),
            tags: Default::default(),
            is_completed: false,
            created_at: None,
            updated_at: None,
        }
        .into_task()
        .unwrap();
        assert!(task.created_at > 0);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn change_op_parses_from_wire_strings() {
        for op in [ChangeOp::Create, ChangeOp::Update, ChangeOp::Delete] {
            assert_eq!(op.as_str().parse::<ChangeOp>().unwrap(), op);
        }
        assert!("upsert".parse::<ChangeOp>().is_err());
    }

    #[test]
    fn tags_collapse_duplicates() {
        let json = r#"{"id":"6f7d4d6e-7f2e-4bb3-9c5f-0a9d4c2f1a10",
                       "title":"t","quadrant":2,"tags":["a","a","b"],
                       "createdAt":1,"updatedAt":2}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.tags.len(), 2);
    }
}
