use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::id::{rand_base62, TASK_ID_LENGTH};
use crate::task::{max_retry, Task};

mod payload_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod duration_nanos {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.as_nanos() as i64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

/// The wire form of a task: what actually gets stored as the body at
/// `P:Q:tasks:K`. `process_at` is deliberately not part of this struct's
/// serialized form. It's communicated to the broker out of band, as the
/// sorted-set score, and lives only in memory between construction and
/// enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    pub retry: u32,
    pub retried: u32,
    #[serde(rename = "retry_delay", with = "duration_nanos")]
    pub retry_delay: Duration,
    pub deadline: Option<DateTime<Utc>>,

    #[serde(skip, default)]
    pub process_at: Option<DateTime<Utc>>,
}

impl TaskMessage {
    /// Validate and convert a submission descriptor into its wire form.
    /// This is where `TaskTypeEmpty`, retry clamping, id generation, and
    /// the `delay`/`process_at`/`deadline` precedence rules all happen.
    pub fn from_task(task: Task) -> Result<Self, Error> {
        if task.task_type.is_empty() {
            return Err(Error::TaskTypeEmpty);
        }

        let now = Utc::now();

        let id = if task.id.is_empty() {
            rand_base62(TASK_ID_LENGTH)
        } else {
            task.id
        };

        let retry = task.retry.min(max_retry());

        let deadline = task
            .deadline
            .filter(|d| *d > now);

        let mut process_at = if task.delay > Duration::default() {
            Some(now + chrono::Duration::from_std(task.delay).unwrap_or_else(|_| chrono::Duration::zero()))
        } else {
            None
        };

        if let Some(p) = task.process_at {
            if p > now {
                process_at = Some(p);
            }
        }

        Ok(TaskMessage {
            id,
            task_type: task.task_type,
            payload: task.payload,
            retry,
            retried: 0,
            retry_delay: task.retry_delay,
            deadline,
            process_at,
        })
    }

    /// `type + "-" + id`, the uniqueness token used throughout the store.
    pub fn key(&self) -> String {
        format!("{}-{}", self.task_type, self.id)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(Error::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(Error::from)
    }

    /// `Err(TaskDeadlineExceeded)` iff `deadline` is set and has passed.
    pub fn check_deadline(&self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.deadline {
            Some(d) if now > d => Err(Error::TaskDeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// The handler-visible, defensive-copy view of a task. Mutations the
/// handler makes to its `payload` never affect the stored wire message.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: String,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub retry: u32,
    pub retried: u32,
}

impl From<&TaskMessage> for TaskInfo {
    fn from(msg: &TaskMessage) -> Self {
        TaskInfo {
            id: msg.id.clone(),
            task_type: msg.task_type.clone(),
            payload: msg.payload.clone(),
            retry: msg.retry,
            retried: msg.retried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskMessage {
        TaskMessage {
            id: "abc123".to_string(),
            task_type: "greet".to_string(),
            payload: b"hello world".to_vec(),
            retry: 3,
            retried: 1,
            retry_delay: Duration::from_secs(30),
            deadline: Some(Utc::now()),
            process_at: None,
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let msg = sample();
        let decoded = TaskMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn key_is_type_hyphen_id() {
        let msg = sample();
        assert_eq!(msg.key(), "greet-abc123");
    }

    #[test]
    fn key_is_stable_across_round_trip() {
        let msg = sample();
        let decoded = TaskMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(msg.key(), decoded.key());
    }

    #[test]
    fn empty_type_is_rejected() {
        let task = Task::new("   ", b"x".to_vec());
        let err = TaskMessage::from_task(task).unwrap_err();
        assert!(matches!(err, Error::TaskTypeEmpty));
    }

    #[test]
    fn retry_above_five_is_clamped() {
        let task = Task::new("t", b"x".to_vec()).retry(20);
        let msg = TaskMessage::from_task(task).unwrap();
        assert_eq!(msg.retry, 5);
    }

    #[test]
    fn empty_id_is_generated_as_six_char_base62() {
        let task = Task::new("t", b"x".to_vec());
        let msg = TaskMessage::from_task(task).unwrap();
        assert_eq!(msg.id.len(), 6);
    }

    #[test]
    fn explicit_id_is_preserved() {
        let task = Task::new("t", b"x".to_vec()).id("my-id");
        let msg = TaskMessage::from_task(task).unwrap();
        assert_eq!(msg.id, "my-id");
    }

    #[test]
    fn process_at_wins_over_delay_when_strictly_future() {
        let now = Utc::now();
        let process_at = now + chrono::Duration::seconds(10);
        let task = Task::new("t", b"x".to_vec())
            .delay(Duration::from_secs(1))
            .process_at(process_at);
        let msg = TaskMessage::from_task(task).unwrap();
        assert_eq!(msg.process_at, Some(process_at));
    }

    #[test]
    fn process_at_in_the_past_does_not_override_delay() {
        let now = Utc::now();
        let task = Task::new("t", b"x".to_vec())
            .delay(Duration::from_secs(60))
            .process_at(now - chrono::Duration::seconds(10));
        let msg = TaskMessage::from_task(task).unwrap();
        assert!(msg.process_at.is_some());
        assert!(msg.process_at.unwrap() > now);
    }

    #[test]
    fn deadline_in_the_past_is_dropped() {
        let task = Task::new("t", b"x".to_vec()).deadline(Utc::now() - chrono::Duration::seconds(5));
        let msg = TaskMessage::from_task(task).unwrap();
        assert!(msg.deadline.is_none());
    }

    #[test]
    fn check_deadline_detects_past_deadline() {
        let mut msg = sample();
        msg.deadline = Some(Utc::now() - chrono::Duration::seconds(1));
        let err = msg.check_deadline(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::TaskDeadlineExceeded));
    }

    #[test]
    fn check_deadline_passes_with_no_deadline() {
        let mut msg = sample();
        msg.deadline = None;
        assert!(msg.check_deadline(Utc::now()).is_ok());
    }

    #[test]
    fn task_info_is_a_deep_copy() {
        let msg = sample();
        let mut info = TaskInfo::from(&msg);
        info.payload.push(b'!');
        assert_ne!(info.payload, msg.payload);
    }
}
