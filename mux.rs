use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::message::TaskInfo;

/// A handler for one task type. `C` is whatever ambient context the server
/// was configured to hand out via `base_context_fn` (see [`crate::ServerBuilder`]);
/// it defaults to `()` for servers that don't need one.
#[async_trait]
pub trait Handler<C = ()>: Send + Sync {
    async fn process_task(&self, ctx: C, task: TaskInfo) -> Result<(), anyhow::Error>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<C, F, Fut> Handler<C> for FnHandler<F>
where
    C: Send + 'static,
    F: Fn(C, TaskInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send,
{
    async fn process_task(&self, ctx: C, task: TaskInfo) -> Result<(), anyhow::Error> {
        (self.0)(ctx, task).await
    }
}

/// Maps a task `type` string to a handler. Lookup takes a shared lock,
/// registration an exclusive one; registering the same type twice is a
/// [`Error::HandlerOverlap`].
pub struct Mux<C = ()> {
    handlers: RwLock<HashMap<String, Arc<dyn Handler<C>>>>,
}

impl<C> Default for Mux<C> {
    fn default() -> Self {
        Mux {
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Send + Sync + 'static> Mux<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler implementation for `task_type`.
    pub fn handle(
        &self,
        task_type: impl Into<String>,
        handler: impl Handler<C> + 'static,
    ) -> Result<(), Error> {
        self.insert(task_type.into(), Arc::new(handler))
    }

    /// Register an async function as the handler for `task_type`.
    pub fn handle_fn<F, Fut>(&self, task_type: impl Into<String>, f: F) -> Result<(), Error>
    where
        F: Fn(C, TaskInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.insert(task_type.into(), Arc::new(FnHandler(f)))
    }

    fn insert(&self, task_type: String, handler: Arc<dyn Handler<C>>) -> Result<(), Error> {
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&task_type) {
            return Err(Error::HandlerOverlap);
        }
        handlers.insert(task_type, handler);
        Ok(())
    }

    pub(crate) fn resolve(&self, task_type: &str) -> Option<Arc<dyn Handler<C>>> {
        self.handlers.read().unwrap().get(task_type).cloned()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_and_resolves() {
        let mux: Mux = Mux::new();
        mux.handle_fn("greet", |_ctx, _task| async { Ok(()) }).unwrap();
        assert!(mux.resolve("greet").is_some());
        assert!(mux.resolve("other").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_an_overlap() {
        let mux: Mux = Mux::new();
        mux.handle_fn("greet", |_ctx, _task| async { Ok(()) }).unwrap();
        let err = mux.handle_fn("greet", |_ctx, _task| async { Ok(()) }).unwrap_err();
        assert!(matches!(err, Error::HandlerOverlap));
    }

    #[test]
    fn starts_empty() {
        let mux: Mux = Mux::new();
        assert!(mux.is_empty());
    }
}
