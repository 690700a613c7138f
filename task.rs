use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default number of retries for a task that doesn't configure one.
const TASK_DEFAULT_RETRY: u32 = 3;

/// Retries are clamped to this ceiling regardless of what the caller asks
/// for.
const TASK_MAX_RETRY: u32 = 5;

/// A task submission descriptor: what a producer builds and hands to a
/// [`crate::Client`]. Immutable once built; converting it into the wire
/// [`crate::TaskMessage`] form (at enqueue time) is where validation and id
/// generation happen.
#[derive(Clone)]
pub struct Task {
    pub(crate) id: String,
    pub(crate) task_type: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) delay: Duration,
    pub(crate) retry: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) process_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("type", &self.task_type)
            .field("payload_len", &self.payload.len())
            .field("delay", &self.delay)
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("deadline", &self.deadline)
            .field("process_at", &self.process_at)
            .finish()
    }
}

impl Task {
    /// Build a new task. `task_type` selects the handler at dispatch time;
    /// it's trimmed of surrounding whitespace but not validated until the
    /// task is enqueued (empty types fail with [`crate::Error::TaskTypeEmpty`]
    /// there, not here).
    pub fn new(task_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Task {
            id: String::new(),
            task_type: task_type.into().trim().to_string(),
            payload: payload.into(),
            delay: Duration::default(),
            retry: TASK_DEFAULT_RETRY,
            retry_delay: Duration::default(),
            deadline: None,
            process_at: None,
        }
    }

    /// Use this id instead of generating one. It's the caller's
    /// responsibility to keep it unique if idempotency matters.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into().trim().to_string();
        self
    }

    /// Defer the first attempt by this long. Overridden by [`Task::process_at`]
    /// if that's set to a strictly later instant.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Maximum number of retries. Clamped to 5 at enqueue time.
    #[must_use]
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Delay inserted before each retry attempt.
    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Absolute instant after which execution must not start. Only recorded
    /// if strictly in the future when the task is enqueued.
    #[must_use]
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Absolute instant to run at. Wins over [`Task::delay`] if strictly in
    /// the future at enqueue time.
    #[must_use]
    pub fn process_at(mut self, process_at: DateTime<Utc>) -> Self {
        self.process_at = Some(process_at);
        self
    }
}

pub(crate) const fn max_retry() -> u32 {
    TASK_MAX_RETRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_type_and_id() {
        let t = Task::new("  greet  ", b"hi".to_vec()).id("  abc  ");
        assert_eq!(t.task_type, "greet");
        assert_eq!(t.id, "abc");
    }

    #[test]
    fn defaults_are_retry_three_and_otherwise_unset() {
        let t = Task::new("greet", b"hi".to_vec());
        assert_eq!(t.retry, TASK_DEFAULT_RETRY);
        assert_eq!(t.delay, Duration::default());
        assert_eq!(t.retry_delay, Duration::default());
        assert!(t.deadline.is_none());
        assert!(t.process_at.is_none());
    }
}
