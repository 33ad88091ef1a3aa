//! Task generation and answer checking.
//!
//! The protocol layer only asks four questions of a policy; what a task
//! looks like and what counts as a correct answer is up to the policy.

use rand::seq::IndexedRandom;

/// Decides what tasks look like and which answers are correct.
pub trait TaskPolicy: Send + Sync {
    /// Whether `command` asks for a new task.
    fn is_task_request(&self, command: &str) -> bool;

    /// Produce a task to hand out.
    fn random_task(&self) -> String;

    /// Whether `answer` solves `task`. A client without a task never answers correctly.
    fn answered_correctly(&self, task: Option<&str>, answer: &str) -> bool;

    /// Response sent for a correct answer.
    fn ok_token(&self) -> &str;

    /// Response sent for a wrong answer.
    fn error_token(&self) -> &str;
}

const TASK_REQUEST: &str = "task";

const SENTENCES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog",
    "Sockets carry bytes between processes",
    "A datagram either arrives whole or not at all",
    "Streams have no message boundaries",
    "Every command ends with a period",
    "Ports tell services apart",
    "Hello world",
];

/// Tasks are sentences, answered by their word count.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentencePolicy;

impl SentencePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl TaskPolicy for SentencePolicy {
    fn is_task_request(&self, command: &str) -> bool {
        command.trim().eq_ignore_ascii_case(TASK_REQUEST)
    }

    fn random_task(&self) -> String {
        SENTENCES
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(SENTENCES[0])
            .to_string()
    }

    fn answered_correctly(&self, task: Option<&str>, answer: &str) -> bool {
        let Some(task) = task else {
            return false;
        };
        match answer.trim().parse::<usize>() {
            Ok(count) => count == task.split_whitespace().count(),
            Err(_) => false,
        }
    }

    fn ok_token(&self) -> &str {
        "ok"
    }

    fn error_token(&self) -> &str {
        "error"
    }
}
