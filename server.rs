use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::broker::Broker;
use crate::error::Error;
use crate::message::{TaskInfo, TaskMessage};
use crate::mux::Mux;
use crate::shutdown::Shutdown;
use crate::worker::spawn_pipeline;

/// Well-known queue names matching the default matrix.
pub const CRITICAL: &str = "critical";
pub const DEFAULT: &str = "default";
pub const LOWER: &str = "lower";

fn default_matrix() -> HashMap<String, i64> {
    HashMap::from([
        (CRITICAL.to_string(), 5),
        (DEFAULT.to_string(), 3),
        (LOWER.to_string(), 1),
    ])
}

/// Builds a [`Server`], validating the executor matrix and supplying
/// defaults for the context supplier and error handler, matching the
/// `ServerOption` functional-options surface of the original implementation
/// translated into an idiomatic Rust builder.
pub struct ServerBuilder<C: Send + Sync + 'static = ()> {
    broker: Arc<Broker>,
    matrix: HashMap<String, i64>,
    ctx_fn: Arc<dyn Fn() -> C + Send + Sync>,
    error_handler: Option<Arc<dyn Fn(Error, TaskInfo) + Send + Sync>>,
}

impl<C: Default + Send + Sync + 'static> ServerBuilder<C> {
    pub(crate) fn new(broker: Arc<Broker>) -> Self {
        ServerBuilder {
            broker,
            matrix: default_matrix(),
            ctx_fn: Arc::new(C::default),
            error_handler: None,
        }
    }
}

impl<C: Send + Sync + 'static> ServerBuilder<C> {
    /// Replace the executor matrix. Entries with a worker count `<= 0` are
    /// dropped; an empty result after dropping is [`Error::MatrixEmpty`].
    #[must_use]
    pub fn matrix(mut self, matrix: HashMap<String, i64>) -> Self {
        self.matrix = matrix;
        self
    }

    /// Supplies the context value handed to every handler invocation.
    #[must_use]
    pub fn base_context_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.ctx_fn = Arc::new(f);
        self
    }

    /// Invoked once per failure or deadline event, concurrently with
    /// continued processing. Must be crash-safe; panics inside it are not
    /// caught.
    #[must_use]
    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Error, TaskInfo) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Server<C>, Error> {
        let matrix: HashMap<String, usize> = self
            .matrix
            .into_iter()
            .filter(|(_, workers)| *workers > 0)
            .map(|(queue, workers)| (queue, workers as usize))
            .collect();

        if matrix.is_empty() {
            return Err(Error::MatrixEmpty);
        }

        Ok(Server {
            inner: Arc::new(ServerInner {
                broker: self.broker,
                matrix,
                ctx_fn: self.ctx_fn,
                error_handler: self.error_handler,
                lifecycle: Mutex::new(Lifecycle {
                    running: false,
                    shutdown: None,
                    handles: Vec::new(),
                }),
            }),
        })
    }
}

struct Lifecycle {
    running: bool,
    shutdown: Option<Shutdown>,
    handles: Vec<JoinHandle<()>>,
}

struct ServerInner<C> {
    broker: Arc<Broker>,
    matrix: HashMap<String, usize>,
    ctx_fn: Arc<dyn Fn() -> C + Send + Sync>,
    error_handler: Option<Arc<dyn Fn(Error, TaskInfo) + Send + Sync>>,
    lifecycle: Mutex<Lifecycle>,
}

/// Owns the per-queue worker pipelines and dispatches dequeued messages to
/// user handlers. `Start`/`Stop` are idempotent and serialized under a
/// lifecycle lock that's never held across an `.await`.
pub struct Server<C: Send + Sync + 'static = ()> {
    inner: Arc<ServerInner<C>>,
}

impl<C: Send + Sync + 'static> Clone for Server<C> {
    fn clone(&self) -> Self {
        Server {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Server<C> {
    /// Begin processing. `mux` must have at least one registered handler
    /// or this fails with [`Error::MuxEmpty`]. Rust has no nil `*Mux` to
    /// check the way the original implementation does, so emptiness is the
    /// closest equivalent signal that the caller forgot to wire up
    /// handlers.
    pub fn start(&self, mux: Mux<C>) -> Result<(), Error> {
        if mux.is_empty() {
            return Err(Error::MuxEmpty);
        }

        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        if lifecycle.running {
            return Ok(());
        }

        let shutdown = Shutdown::new();
        let mux = Arc::new(mux);

        let mut handles = Vec::new();
        for (queue, workers) in &self.inner.matrix {
            let inner = self.inner.clone();
            let mux = mux.clone();
            let process = move |queue: String, msg: TaskMessage| {
                let inner = inner.clone();
                let mux = mux.clone();
                async move { dispatch(inner, mux, queue, msg).await }
            };

            handles.extend(spawn_pipeline(
                self.inner.broker.clone(),
                queue.clone(),
                *workers,
                shutdown.consumer(),
                process,
            ));
        }

        lifecycle.shutdown = Some(shutdown);
        lifecycle.handles = handles;
        lifecycle.running = true;

        Ok(())
    }

    /// Signal shutdown and block until every executor has drained and
    /// exited. Idempotent; a blocked handler blocks this call (there is no
    /// hard timeout, see design notes).
    pub async fn stop(&self) -> Result<(), Error> {
        let (shutdown, handles) = {
            let mut lifecycle = self.inner.lifecycle.lock().unwrap();
            if !lifecycle.running {
                return Ok(());
            }
            lifecycle.running = false;
            (lifecycle.shutdown.take(), std::mem::take(&mut lifecycle.handles))
        };

        if let Some(shutdown) = shutdown {
            shutdown.shutdown();
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().unwrap().running
    }
}

async fn dispatch<C: Send + Sync + 'static>(
    inner: Arc<ServerInner<C>>,
    mux: Arc<Mux<C>>,
    queue: String,
    msg: TaskMessage,
) {
    let now = Utc::now();
    let info = TaskInfo::from(&msg);

    if let Err(e) = msg.check_deadline(now) {
        invoke_error_handler(&inner, e, info);
        return;
    }

    let handler = match mux.resolve(&msg.task_type) {
        Some(h) => h,
        None => {
            handle_failure(&inner, queue, msg, Error::HandlerNotFound).await;
            return;
        }
    };

    let ctx = (inner.ctx_fn)();
    let info = TaskInfo::from(&msg);
    let outcome = AssertUnwindSafe(handler.process_task(ctx, info))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            // Success: the body was already deleted atomically on dequeue.
        }
        Ok(Err(e)) => handle_failure(&inner, queue, msg, Error::Handler(e)).await,
        Err(panic) => {
            let e = Error::Handler(anyhow::anyhow!(panic_message(panic)));
            handle_failure(&inner, queue, msg, e).await;
        }
    }
}

async fn handle_failure<C: Send + Sync + 'static>(
    inner: &Arc<ServerInner<C>>,
    queue: String,
    mut msg: TaskMessage,
    err: Error,
) {
    let info = TaskInfo::from(&msg);
    invoke_error_handler(inner, err, info);

    if msg.retried < msg.retry {
        msg.retried += 1;
        let retry_delay =
            chrono::Duration::from_std(msg.retry_delay).unwrap_or_else(|_| chrono::Duration::zero());
        msg.process_at = Some(Utc::now() + retry_delay);

        // Re-enqueue from a fresh, detached invocation: it must succeed
        // even if whatever triggered the original task is long gone.
        if let Err(e) = inner.broker.enqueue(&queue, &msg).await {
            event!(Level::ERROR, %queue, key = %msg.key(), error = %e, "failed to re-enqueue retry");
        }
    }
}

fn invoke_error_handler<C: Send + Sync + 'static>(inner: &Arc<ServerInner<C>>, err: Error, info: TaskInfo) {
    if let Some(handler) = inner.error_handler.clone() {
        // Dispatched onto a blocking task so a slow/expensive callback
        // never holds up the executor that produced it.
        tokio::task::spawn_blocking(move || handler(err, info));
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
