use tokio::sync::watch;

/// A one-shot, broadcastable shutdown signal scoped to a single [`crate::Server`].
/// Cloning a [`ShutdownConsumer`] is cheap, so every promoter/fetcher/executor
/// task gets its own handle onto the same underlying signal.
pub struct Shutdown {
    tx: watch::Sender<bool>,
    consumer: ShutdownConsumer,
}

#[derive(Clone)]
pub struct ShutdownConsumer(watch::Receiver<bool>);

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Shutdown {
            tx,
            consumer: ShutdownConsumer(rx),
        }
    }

    pub fn consumer(&self) -> ShutdownConsumer {
        self.consumer.clone()
    }

    /// Signal every consumer to stop. Idempotent.
    pub fn shutdown(&self) {
        // Ignore the error: it only fires if every receiver has already
        // been dropped, which just means there's nothing left to notify.
        let _ = self.tx.send(true);
    }
}

impl ShutdownConsumer {
    pub fn is_shutting_down(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been signaled.
    pub async fn wait_for_shutdown(&mut self) {
        loop {
            if *self.0.borrow() {
                return;
            }
            if self.0.changed().await.is_err() {
                // Sender dropped without ever signaling true: treat as shutdown.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn consumer_observes_shutdown() {
        let shutdown = Shutdown::new();
        let mut consumer = shutdown.consumer();
        assert!(!consumer.is_shutting_down());

        shutdown.shutdown();

        timeout(Duration::from_secs(1), consumer.wait_for_shutdown())
            .await
            .expect("shutdown should be observed promptly");
        assert!(consumer.is_shutting_down());
    }

    #[tokio::test]
    async fn consumers_created_after_shutdown_see_it_immediately() {
        let shutdown = Shutdown::new();
        shutdown.shutdown();
        let consumer = shutdown.consumer();
        assert!(consumer.is_shutting_down());
    }
}
