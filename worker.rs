use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::broker::Broker;
use crate::error::Error;
use crate::message::TaskMessage;
use crate::shutdown::ShutdownConsumer;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the promoter + fetcher + N executors for one queue. Returns every
/// `JoinHandle` so the server can await them all on shutdown. `process` is
/// invoked once per dequeued message by whichever executor picks it up.
pub(crate) fn spawn_pipeline<F, Fut>(
    broker: Arc<Broker>,
    queue: String,
    workers: usize,
    shutdown: ShutdownConsumer,
    process: F,
) -> Vec<JoinHandle<()>>
where
    F: Fn(String, TaskMessage) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut handles = Vec::with_capacity(workers + 2);

    handles.push(spawn_promoter(broker.clone(), queue.clone(), shutdown.clone()));

    let (tx, rx) = mpsc::channel::<TaskMessage>(workers.max(1));
    handles.push(spawn_fetcher(broker, queue.clone(), shutdown, tx));

    let rx = Arc::new(Mutex::new(rx));
    for _ in 0..workers {
        handles.push(spawn_executor(queue.clone(), rx.clone(), process.clone()));
    }

    handles
}

fn spawn_promoter(broker: Arc<Broker>, queue: String, mut shutdown: ShutdownConsumer) -> JoinHandle<()> {
    tokio::spawn(async move {
        event!(Level::DEBUG, %queue, "promoter started");
        loop {
            match broker.promote_scheduled(&queue).await {
                Ok(n) if n > 0 => {
                    event!(Level::INFO, %queue, promoted = n, "promoted scheduled tasks");
                }
                Ok(_) => {}
                Err(e) => {
                    event!(Level::ERROR, %queue, error = %e, "failed to promote scheduled tasks");
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.wait_for_shutdown() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
        event!(Level::DEBUG, %queue, "promoter stopped");
    })
}

fn spawn_fetcher(
    broker: Arc<Broker>,
    queue: String,
    mut shutdown: ShutdownConsumer,
    tx: mpsc::Sender<TaskMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        event!(Level::DEBUG, %queue, "fetcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for_shutdown() => break,
                result = broker.dequeue(&queue) => {
                    match result {
                        Ok(msg) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(Error::Empty) => {
                            if sleep_or_shutdown(&mut shutdown).await {
                                break;
                            }
                        }
                        Err(e) => {
                            event!(Level::ERROR, %queue, error = %e, "failed to dequeue task");
                            if sleep_or_shutdown(&mut shutdown).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
        // Dropping `tx` here closes the channel, which lets the executors
        // drain what's left and exit.
        event!(Level::DEBUG, %queue, "fetcher stopped");
    })
}

/// Sleep for one poll interval, but wake early (returning `true`) if
/// shutdown is signaled in the meantime.
async fn sleep_or_shutdown(shutdown: &mut ShutdownConsumer) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.wait_for_shutdown() => true,
        _ = tokio::time::sleep(POLL_INTERVAL) => false,
    }
}

fn spawn_executor<F, Fut>(
    queue: String,
    rx: Arc<Mutex<mpsc::Receiver<TaskMessage>>>,
    process: F,
) -> JoinHandle<()>
where
    F: Fn(String, TaskMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        event!(Level::DEBUG, %queue, "executor started");
        loop {
            let msg = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };

            match msg {
                Some(msg) => process(queue.clone(), msg).await,
                None => break,
            }
        }
        event!(Level::DEBUG, %queue, "executor stopped");
    })
}
