//! Task protocol state machine.
//!
//! Every command is either a task request or an answer to the task the
//! client holds. A step is computed from the client's current state and
//! returns the response together with the task to record, which the
//! dispatcher commits only after the response went out.
//!
//! ```text
//! NoTaskAssigned --task request, sent--> TaskPending(t)
//! TaskPending(t) --task request, sent--> TaskPending(t')
//! TaskPending(t) --answer--------------> TaskPending(t)   (ok / error)
//! NoTaskAssigned --answer--------------> NoTaskAssigned   (error)
//! ```

use crate::policy::TaskPolicy;
use crate::session::ClientSession;
use serde::Deserialize;
use std::sync::Arc;

/// Task-related state of one client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    NoTaskAssigned,
    TaskPending(String),
}

impl TaskState {
    pub fn task(&self) -> Option<&str> {
        match self {
            TaskState::NoTaskAssigned => None,
            TaskState::TaskPending(task) => Some(task),
        }
    }
}

impl From<&ClientSession> for TaskState {
    fn from(session: &ClientSession) -> Self {
        match &session.assigned_task {
            Some(task) => TaskState::TaskPending(task.clone()),
            None => TaskState::NoTaskAssigned,
        }
    }
}

/// Which task goes out in response to a task request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Send the freshly generated task and record it.
    #[default]
    Current,
    /// Send the previously recorded task (empty if none) but record the
    /// fresh one. Only the stream transport honors this mode.
    Previous,
}

/// Outcome of processing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Bytes to send back
    pub response: String,
    /// Task to record once `response` has been sent
    pub assign: Option<String>,
}

/// Decision logic shared by both transports.
#[derive(Clone)]
pub struct TaskProtocol {
    policy: Arc<dyn TaskPolicy>,
    reply_mode: ReplyMode,
}

impl TaskProtocol {
    pub fn new(policy: Arc<dyn TaskPolicy>, reply_mode: ReplyMode) -> Self {
        Self { policy, reply_mode }
    }

    /// Decide the response to `command` given the client's `state`.
    pub fn step(&self, state: &TaskState, command: &str) -> Step {
        if self.policy.is_task_request(command) {
            let task = self.policy.random_task();
            let response = match self.reply_mode {
                ReplyMode::Current => task.clone(),
                ReplyMode::Previous => state.task().unwrap_or_default().to_string(),
            };
            Step {
                response,
                assign: Some(task),
            }
        } else {
            let token = if self.policy.answered_correctly(state.task(), command) {
                self.policy.ok_token()
            } else {
                self.policy.error_token()
            };
            Step {
                response: token.to_string(),
                assign: None,
            }
        }
    }
}

impl std::fmt::Debug for TaskProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProtocol")
            .field("reply_mode", &self.reply_mode)
            .finish_non_exhaustive()
    }
}
