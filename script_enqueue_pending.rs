use lazy_static::lazy_static;

use crate::broker::Broker;
use crate::error::Error;
use crate::message::TaskMessage;

// Pending-enqueue: claim the body key, register the queue name, push onto
// the pending FIFO. The `SET ... NX` is the sole uniqueness gate; every
// other key touched here is index bookkeeping.
//
// KEYS:
//  1. task body key (P:Q:tasks:K)
//  2. known-queues set (P:queues)
//  3. pending list (P:Q:pending)
// ARGV:
//  1. encoded task body
//  2. queue name
//  3. task key (K)
const ENQUEUE_PENDING_SCRIPT: &str = r##"
    local ok = redis.call("SET", KEYS[1], ARGV[1], "NX")
    if not ok then
        return 0
    end

    redis.call("SADD", KEYS[2], ARGV[2])
    redis.call("LPUSH", KEYS[3], ARGV[3])

    return 1
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(ENQUEUE_PENDING_SCRIPT);
}

pub struct EnqueuePendingScript(&'static redis::Script);

impl EnqueuePendingScript {
    pub fn new() -> Self {
        EnqueuePendingScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        broker: &Broker,
        conn: &mut deadpool_redis::Connection,
        queue: &str,
        msg: &TaskMessage,
    ) -> Result<(), Error> {
        let key = msg.key();
        let body = msg.encode()?;

        let claimed: i64 = self
            .0
            .key(broker.key_task(queue, &key))
            .key(broker.key_queues())
            .key(broker.key_pending(queue))
            .arg(body)
            .arg(queue)
            .arg(&key)
            .invoke_async(&mut **conn)
            .await?;

        if claimed == 1 {
            Ok(())
        } else {
            Err(Error::TaskAlreadyExists)
        }
    }
}
