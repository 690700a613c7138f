use chrono::Utc;

use crate::error::Error;
use crate::message::TaskMessage;
use crate::script_dequeue::DequeueScript;
use crate::script_enqueue_pending::EnqueuePendingScript;
use crate::script_enqueue_scheduled::EnqueueScheduledScript;
use crate::script_promote::PromoteScheduledScript;

/// All interaction with the store goes through a `Broker`. Every
/// state-changing operation is a single-round-trip atomic script so that
/// the uniqueness/FIFO/promotion invariants spanning the body, pending, and
/// scheduled keys never depend on client-side coordination between
/// commands.
pub struct Broker {
    pool: deadpool_redis::Pool,
    prefix: String,
    enqueue_pending_script: EnqueuePendingScript,
    enqueue_scheduled_script: EnqueueScheduledScript,
    dequeue_script: DequeueScript,
    promote_script: PromoteScheduledScript,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").field("prefix", &self.prefix).finish()
    }
}

/// Normalize a user-supplied prefix into `<prefix>:qsync`, lowercased and
/// trimmed of surrounding colons, with an optional `{cluster}` hash-tag so
/// every key for this deployment lands on one cluster slot.
pub(crate) fn normalize_prefix(prefix: &str, cluster: bool) -> String {
    let mut p = prefix.trim().to_lowercase();
    p.push_str(":qsync");
    let p = p.trim_matches(':').to_string();
    if cluster {
        format!("{}{{cluster}}", p)
    } else {
        p
    }
}

/// Probe the store for cluster mode by issuing `CLUSTER NODES`. Any error
/// (including "this command is not allowed in cluster mode" on a
/// non-cluster server prior to certain versions, or a plain connection
/// error) is treated as "not clustered", the probe is advisory, not a
/// correctness requirement.
pub async fn detect_cluster(pool: &deadpool_redis::Pool) -> bool {
    let mut conn = match pool.get().await {
        Ok(c) => c,
        Err(_) => return false,
    };

    redis::cmd("CLUSTER")
        .arg("NODES")
        .query_async::<_, String>(&mut conn)
        .await
        .is_ok()
}

impl Broker {
    pub fn new(pool: deadpool_redis::Pool, prefix: &str, cluster: bool) -> Self {
        Broker {
            pool,
            prefix: normalize_prefix(prefix, cluster),
            enqueue_pending_script: EnqueuePendingScript::new(),
            enqueue_scheduled_script: EnqueueScheduledScript::new(),
            dequeue_script: DequeueScript::new(),
            promote_script: PromoteScheduledScript::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn key_queues(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    pub(crate) fn key_tasks_prefix(&self, queue: &str) -> String {
        format!("{}:{}:tasks", self.prefix, queue)
    }

    pub(crate) fn key_task(&self, queue: &str, key: &str) -> String {
        format!("{}:{}:tasks:{}", self.prefix, queue, key)
    }

    pub(crate) fn key_pending(&self, queue: &str) -> String {
        format!("{}:{}:pending", self.prefix, queue)
    }

    pub(crate) fn key_scheduled(&self, queue: &str) -> String {
        format!("{}:{}:scheduled", self.prefix, queue)
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    /// Enqueue `msg` onto `queue`. Routes to the scheduled path if
    /// `process_at` is strictly in the future, otherwise immediate/pending.
    pub async fn enqueue(&self, queue: &str, msg: &TaskMessage) -> Result<(), Error> {
        if queue.trim().is_empty() {
            return Err(Error::QueueNameEmpty);
        }

        let mut conn = self.pool.get().await?;
        match msg.process_at {
            Some(at) if at > Utc::now() => {
                self.enqueue_scheduled_script
                    .run(self, &mut conn, queue, msg, at.timestamp_nanos())
                    .await
            }
            _ => {
                self.enqueue_pending_script
                    .run(self, &mut conn, queue, msg)
                    .await
            }
        }
    }

    /// Pop and return the next ready task on `queue`, or `Err(Error::Empty)`
    /// if nothing is pending.
    pub async fn dequeue(&self, queue: &str) -> Result<TaskMessage, Error> {
        let mut conn = self.pool.get().await?;
        self.dequeue_script.run(self, &mut conn, queue).await
    }

    /// Move every scheduled entry whose score has been reached into
    /// pending. Returns how many were promoted.
    pub async fn promote_scheduled(&self, queue: &str) -> Result<usize, Error> {
        let mut conn = self.pool.get().await?;
        self.promote_script
            .run(self, &mut conn, queue, Utc::now().timestamp_nanos())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("  MyApp  ", false), "myapp:qsync");
        assert_eq!(normalize_prefix("", false), "qsync");
        // A trailing colon on the input collides with the colon joining
        // ":qsync"; only leading/trailing colons of the *whole* string are
        // trimmed, matching the original implementation's `strings.Trim`.
        assert_eq!(normalize_prefix(":myapp:", false), "myapp::qsync");
    }

    #[test]
    fn appends_cluster_hash_tag() {
        assert_eq!(normalize_prefix("myapp", true), "myapp:qsync{cluster}");
    }
}
