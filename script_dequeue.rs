use lazy_static::lazy_static;

use crate::broker::Broker;
use crate::error::Error;
use crate::message::TaskMessage;

// Dequeue: pop one key off the pending FIFO and atomically consume its
// body. A popped key with a missing body would only happen if a task were
// deleted out from under a pending reference; we treat it the same as an
// empty pop rather than surfacing a distinct error for a case that should
// be unreachable in practice.
//
// KEYS:
//  1. pending list (P:Q:pending)
//  2. task body key prefix (P:Q:tasks)
const DEQUEUE_SCRIPT: &str = r##"
    local taskKey = redis.call("RPOP", KEYS[1])
    if not taskKey then
        return false
    end

    local bodyKey = KEYS[2] .. ":" .. taskKey
    local body = redis.call("GET", bodyKey)
    if body then
        redis.call("DEL", bodyKey)
        return body
    end

    return false
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(DEQUEUE_SCRIPT);
}

pub struct DequeueScript(&'static redis::Script);

impl DequeueScript {
    pub fn new() -> Self {
        DequeueScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        broker: &Broker,
        conn: &mut deadpool_redis::Connection,
        queue: &str,
    ) -> Result<TaskMessage, Error> {
        let body: Option<Vec<u8>> = self
            .0
            .key(broker.key_pending(queue))
            .key(broker.key_tasks_prefix(queue))
            .invoke_async(&mut **conn)
            .await?;

        match body {
            Some(bytes) => TaskMessage::decode(&bytes),
            None => Err(Error::Empty),
        }
    }
}
