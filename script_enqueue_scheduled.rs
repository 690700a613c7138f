use lazy_static::lazy_static;

use crate::broker::Broker;
use crate::error::Error;
use crate::message::TaskMessage;

// Scheduled-enqueue: identical uniqueness gate as the pending variant, but
// the index write is a ZADD keyed by the processAt instant (nanoseconds
// since epoch) instead of an LPUSH.
//
// KEYS:
//  1. task body key (P:Q:tasks:K)
//  2. known-queues set (P:queues)
//  3. scheduled sorted-set (P:Q:scheduled)
// ARGV:
//  1. encoded task body
//  2. queue name
//  3. task key (K)
//  4. score (processAt, nanoseconds)
const ENQUEUE_SCHEDULED_SCRIPT: &str = r##"
    local ok = redis.call("SET", KEYS[1], ARGV[1], "NX")
    if not ok then
        return 0
    end

    redis.call("SADD", KEYS[2], ARGV[2])
    redis.call("ZADD", KEYS[3], ARGV[4], ARGV[3])

    return 1
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(ENQUEUE_SCHEDULED_SCRIPT);
}

pub struct EnqueueScheduledScript(&'static redis::Script);

impl EnqueueScheduledScript {
    pub fn new() -> Self {
        EnqueueScheduledScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        broker: &Broker,
        conn: &mut deadpool_redis::Connection,
        queue: &str,
        msg: &TaskMessage,
        score_nanos: i64,
    ) -> Result<(), Error> {
        let key = msg.key();
        let body = msg.encode()?;

        let claimed: i64 = self
            .0
            .key(broker.key_task(queue, &key))
            .key(broker.key_queues())
            .key(broker.key_scheduled(queue))
            .arg(body)
            .arg(queue)
            .arg(&key)
            .arg(score_nanos)
            .invoke_async(&mut **conn)
            .await?;

        if claimed == 1 {
            Ok(())
        } else {
            Err(Error::TaskAlreadyExists)
        }
    }
}
