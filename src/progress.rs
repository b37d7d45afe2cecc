//! Progress Tracker - Single In-Flight Job Register
//!
//! One tracker is constructed per process and shared by handle. The
//! background run writes to it, status callers poll it. A terminal status
//! (done or error) is reported exactly once, then the register resets.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Empty,
    InProgress,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Point-in-time view of the register
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(rename = "type")]
    pub job_type: String,
    pub message: String,
    pub percent: f32,
    pub status: JobStatus,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<JobSnapshot>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_type(&self, value: impl Into<String>) {
        let mut state = self.lock();
        state.job_type = value.into();
        trace_state(&state);
    }

    pub fn set_message(&self, value: impl Into<String>) {
        let mut state = self.lock();
        state.message = value.into();
        trace_state(&state);
    }

    pub fn set_percent(&self, value: f32) {
        let mut state = self.lock();
        state.percent = value.clamp(0.0, 100.0);
        trace_state(&state);
    }

    pub fn set_status(&self, value: JobStatus) {
        let mut state = self.lock();
        state.status = value;
        trace_state(&state);
    }

    /// Current state without side effects
    pub fn snapshot(&self) -> JobSnapshot {
        self.lock().clone()
    }

    /// Current state for an external poller.
    ///
    /// Reading a terminal status consumes it: the register is reset to empty
    /// under the same lock, so two pollers never both see the same `Done`.
    pub fn status(&self) -> JobSnapshot {
        let mut state = self.lock();
        let current = state.clone();
        if current.status.is_terminal() {
            *state = JobSnapshot::default();
        }
        current
    }

    pub fn flush(&self) {
        *self.lock() = JobSnapshot::default();
    }
}

fn trace_state(state: &JobSnapshot) {
    debug!(
        job = %state.job_type,
        status = ?state.status,
        "Progress: {} - {:.2}",
        state.message,
        state.percent
    );
}
