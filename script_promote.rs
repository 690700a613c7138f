use lazy_static::lazy_static;

use crate::broker::Broker;
use crate::error::Error;

// Scheduled promotion: move every due entry (score <= now) from the
// scheduled sorted-set to the pending list. Batch size is capped at 100 to
// bound the script's worst-case execution time; anything past that waits
// for the next promoter cycle. The body entry is untouched, this is an
// index-only move.
//
// KEYS:
//  1. scheduled sorted-set (P:Q:scheduled)
//  2. pending list (P:Q:pending)
// ARGV:
//  1. current time (nanoseconds since epoch)
const PROMOTE_SCRIPT: &str = r##"
    local due = redis.call("ZRANGE", KEYS[1], "-inf", ARGV[1], "BYSCORE", "LIMIT", 0, 100)
    for _, key in ipairs(due) do
        redis.call("LPUSH", KEYS[2], key)
        redis.call("ZREM", KEYS[1], key)
    end

    return #due
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(PROMOTE_SCRIPT);
}

pub struct PromoteScheduledScript(&'static redis::Script);

impl PromoteScheduledScript {
    pub fn new() -> Self {
        PromoteScheduledScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        broker: &Broker,
        conn: &mut deadpool_redis::Connection,
        queue: &str,
        now_nanos: i64,
    ) -> Result<usize, Error> {
        let promoted: usize = self
            .0
            .key(broker.key_scheduled(queue))
            .key(broker.key_pending(queue))
            .arg(now_nanos)
            .invoke_async(&mut **conn)
            .await?;

        Ok(promoted)
    }
}
