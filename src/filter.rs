//! Pure query functions over an in-memory task collection.
//!
//! Filters compose as a logical AND and never mutate their input, so the UI
//! layer can re-run them on every render without side effects.

use crate::error::StoreError;
use crate::types::{Quadrant, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Completion-status selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl std::str::FromStr for StatusFilter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(StoreError::Validation(format!(
                "status must be all/active/completed, got {other}"
            ))),
        }
    }
}

impl StatusFilter {
    fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.is_completed,
            StatusFilter::Completed => task.is_completed,
        }
    }
}

/// Composable task filter. Unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    quadrant: Option<Quadrant>,
    tags: Option<BTreeSet<String>>,
    search: Option<String>,
    status: StatusFilter,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact quadrant match.
    pub fn in_quadrant(mut self, quadrant: Quadrant) -> Self {
        self.quadrant = Some(quadrant);
        self
    }

    /// Non-empty intersection with the given tag set.
    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Case-insensitive substring match over title and description.
    pub fn matching(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into().to_lowercase());
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Whether a single task passes every criterion.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(quadrant) = self.quadrant {
            if task.quadrant != quadrant {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags_intersect(&task.tags, tags) {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let in_title = task.title.to_lowercase().contains(needle);
            let in_description = task.description.to_lowercase().contains(needle);
            if !in_title && !in_description {
                return false;
            }
        }
        self.status.matches(task)
    }

    /// Select matching tasks, preserving the input order.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        tasks.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

/// True when the two sets share at least one tag.
pub fn tags_intersect(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    if a.len() <= b.len() {
        a.iter().any(|tag| b.contains(tag))
    } else {
        b.iter().any(|tag| a.contains(tag))
    }
}
