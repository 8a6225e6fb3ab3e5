use suitedbot_core::{TargetType, Task, TaskStatus};

/// A row as read inside a snapshot, together with the version an update
/// must present.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: i64,
}

/// Predicate for task listings. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub target_type: Option<TargetType>,
    pub category: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.target_type.map_or(true, |t| task.target_type == t)
            && self
                .category
                .as_deref()
                .map_or(true, |c| task.category == c)
    }
}
