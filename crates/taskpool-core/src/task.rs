use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Admitted into the intake queue, not yet picked up by a worker
    Queued,
    /// Owned by a worker, either executing or waiting out a retry backoff
    Running,
    /// Work completed successfully
    Done,
    /// Retries exhausted
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }

    /// Done and Failed admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work plus its retry bookkeeping.
///
/// The same value doubles as the snapshot published to the state store, so
/// a query always returns the fields exactly as the owning worker last
/// wrote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-supplied identifier
    pub id: String,

    /// Opaque data handed to the work capability
    pub payload: String,

    /// Ceiling on retry attempts (0 = run once)
    pub max_retries: u32,

    /// Failed attempts so far
    pub retries: u32,

    pub state: TaskState,

    /// Message of the most recent failed attempt
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a queued task with no retries allowed
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        let now = Utc::now();
        Task {
            id: id.into(),
            payload: payload.into(),
            max_retries: 0,
            retries: 0,
            state: TaskState::Queued,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the retry ceiling
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Mark task as picked up by a worker
    pub fn start(&mut self) {
        self.transition(TaskState::Running);
    }

    /// Mark task as completed successfully
    pub fn complete(&mut self) {
        self.transition(TaskState::Done);
    }

    /// Mark task as permanently failed
    pub fn fail(&mut self) {
        self.transition(TaskState::Failed);
    }

    /// Count a failed attempt. The state is left untouched: the caller decides
    /// between [`Task::fail`] and another attempt.
    pub fn record_failure(&mut self, error: impl ToString) {
        self.retries = self.retries.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    /// True once the failure count has passed the retry ceiling
    pub fn retries_exhausted(&self) -> bool {
        self.retries > self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, state: TaskState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
