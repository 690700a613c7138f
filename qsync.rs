use std::sync::Arc;

use crate::broker::{detect_cluster, Broker};
use crate::client::Client;
use crate::error::Error;
use crate::server::ServerBuilder;

/// Top-level entry point: owns the shared [`Broker`] connection and hands
/// out [`Client`]s and [`ServerBuilder`]s against it.
pub struct Qsync {
    broker: Arc<Broker>,
}

impl Qsync {
    /// Connect to `redis_url`, probing for cluster mode so keys get the
    /// `{cluster}` hash-tag automatically. `prefix` namespaces every key
    /// this instance touches, see [`crate::broker::normalize_prefix`].
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, Error> {
        let cfg = deadpool_redis::Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
        let cluster = detect_cluster(&pool).await;
        Ok(Qsync {
            broker: Arc::new(Broker::new(pool, prefix, cluster)),
        })
    }

    /// Wrap an already-constructed pool instead of parsing a URL, e.g. when
    /// the caller wants to share a pool with other subsystems.
    pub async fn with_pool(pool: deadpool_redis::Pool, prefix: &str) -> Self {
        let cluster = detect_cluster(&pool).await;
        Qsync {
            broker: Arc::new(Broker::new(pool, prefix, cluster)),
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.broker.ping().await
    }

    pub fn client(&self) -> Client {
        Client::new(self.broker.clone())
    }

    /// A [`Client`] that validates queue names against `queues` up front,
    /// instead of only discovering a typo the first time a server never
    /// picks the task up.
    pub fn client_with_known_queues<I, S>(&self, queues: I) -> Result<Client, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Client::with_known_queues(self.broker.clone(), queues)
    }

    pub fn server_builder<C: Default + Send + Sync + 'static>(&self) -> ServerBuilder<C> {
        ServerBuilder::new(self.broker.clone())
    }
}
