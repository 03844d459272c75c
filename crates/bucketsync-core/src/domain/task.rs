//! Task entity
//!
//! A [`Task`] binds one [`SyncOperation`] to its execution state for the
//! duration of one batch.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::operation::SyncOperation;

/// Execution state of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum TaskState {
    /// Queued, not yet dispatched
    Pending,
    /// Dispatched and calling its transfer primitive
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error message
    Failed(String),
}

impl TaskState {
    /// Short name used in transition errors
    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Failed(_) => "Failed",
        }
    }

    /// Returns true for Completed and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed(_))
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One queued unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Position of the task in its batch
    index: usize,
    operation: SyncOperation,
    state: TaskState,
}

impl Task {
    /// Creates a pending task
    pub fn new(index: usize, operation: SyncOperation) -> Self {
        Self {
            index,
            operation,
            state: TaskState::Pending,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn operation(&self) -> &SyncOperation {
        &self.operation
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Checks if a state transition is valid
    ///
    /// Valid transitions:
    /// - Pending -> Running
    /// - Running -> Completed, Failed
    ///
    /// Terminal states have no outgoing transitions, so a task can never
    /// run twice.
    pub fn can_transition_to(&self, target: &TaskState) -> bool {
        matches!(
            (&self.state, target),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed(_))
        )
    }

    /// Attempts to transition to a new state
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: TaskState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition_to(TaskState::Running)
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition_to(TaskState::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(TaskState::Failed(reason.into()))
    }
}
