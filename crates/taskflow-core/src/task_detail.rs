//! Per-task persistent record and its merge-on-write update rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::result::TaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
    Reverting,
    Reverted,
}

impl TaskState {
    /// Whether a task in this state has a result worth reading.
    pub fn has_results(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Reverting | TaskState::Failure)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    pub uuid: Uuid,
    pub name: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TaskMeta>,
}

impl TaskDetail {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self { uuid, name: name.into(), state: TaskState::Pending, results: None, meta: None }
    }

    /// Overlay `other`'s fields onto `self`, matching the merge-on-write
    /// contract a `Backend::update_task_details` round-trip relies on.
    pub fn update(&mut self, other: &TaskDetail) {
        self.state = other.state;
        self.results = other.results.clone();
        self.meta = other.meta.clone();
    }
}
