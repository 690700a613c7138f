use thiserror::Error;

/// All error kinds the crate can surface, from task construction through
/// broker scripts to server dispatch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("task is nil")]
    TaskNil,

    #[error("task type is empty")]
    TaskTypeEmpty,

    #[error("task already exists")]
    TaskAlreadyExists,

    #[error("failed to encode task: {0}")]
    TaskEncodeFailed(#[from] serde_json::Error),

    #[error("task deadline exceeded")]
    TaskDeadlineExceeded,

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue set is empty")]
    QueuesEmpty,

    #[error("queue name is empty")]
    QueueNameEmpty,

    #[error("executor matrix is empty")]
    MatrixEmpty,

    #[error("multiplexer is empty")]
    MuxEmpty,

    #[error("handler overlap")]
    HandlerOverlap,

    #[error("handler not found")]
    HandlerNotFound,

    /// A handler returned an error, or panicked (converted via `anyhow`).
    #[error("handler error: {0}")]
    Handler(anyhow::Error),

    /// No item was ready to dequeue. Internal to the broker/fetcher; never
    /// expected to reach a producer-facing API.
    #[error("queue is empty")]
    Empty,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error(transparent)]
    RedisPoolCreation(#[from] deadpool_redis::CreatePoolError),
}
