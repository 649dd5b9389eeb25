//! The persisted container of `TaskDetail`s plus flow-level state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task_detail::TaskDetail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Pending,
    Running,
    Success,
    Failure,
    Reverting,
    Reverted,
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDetail {
    pub uuid: Uuid,
    pub state: FlowState,
    tasks: Vec<TaskDetail>,
}

impl FlowDetail {
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid, state: FlowState::Pending, tasks: Vec::new() }
    }

    pub fn add(&mut self, task: TaskDetail) {
        self.tasks.push(task);
    }

    pub fn by_uuid(&self, uuid: Uuid) -> Option<&TaskDetail> {
        self.tasks.iter().find(|t| t.uuid == uuid)
    }

    pub fn by_uuid_mut(&mut self, uuid: Uuid) -> Option<&mut TaskDetail> {
        self.tasks.iter_mut().find(|t| t.uuid == uuid)
    }

    pub fn by_name(&self, name: &str) -> Option<&TaskDetail> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn contains_uuid(&self, uuid: Uuid) -> bool {
        self.tasks.iter().any(|t| t.uuid == uuid)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    pub fn tasks(&self) -> &[TaskDetail] {
        &self.tasks
    }

    /// Merge another `FlowDetail` into this one: flow state is overlaid,
    /// and each of `other`'s task details is merged into the matching task
    /// here by `uuid`, or appended if this flow doesn't have it yet.
    ///
    /// This is the in-process counterpart of a backend's
    /// `update_flow_details` merge; `Storage` calls it on the value a
    /// `Backend` hands back.
    pub fn update(&mut self, other: &FlowDetail) {
        self.state = other.state;
        for other_task in &other.tasks {
            if let Some(existing) = self.by_uuid_mut(other_task.uuid) {
                existing.update(other_task);
            } else {
                self.tasks.push(other_task.clone());
            }
        }
    }
}
