use std::collections::HashSet;
use std::sync::Arc;

use crate::broker::Broker;
use crate::error::Error;
use crate::message::TaskMessage;
use crate::task::Task;

/// Producer-side handle: submits [`Task`]s onto named queues. Cheap to
/// clone, it only wraps the shared [`Broker`].
#[derive(Clone)]
pub struct Client {
    broker: Arc<Broker>,
    known_queues: Option<Arc<HashSet<String>>>,
}

impl Client {
    pub(crate) fn new(broker: Arc<Broker>) -> Self {
        Client {
            broker,
            known_queues: None,
        }
    }

    /// A client that additionally rejects enqueues onto queues outside
    /// `queues` with [`Error::QueueNotFound`], and refuses to build at all
    /// against an empty set ([`Error::QueuesEmpty`]). The bare [`Client::new`]
    /// constructor performs no such check; any non-empty queue name is
    /// accepted, matching how a client is built without knowing the set of
    /// queues a server will ultimately listen on.
    pub(crate) fn with_known_queues<I, S>(broker: Arc<Broker>, queues: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let known = known_queue_set(queues)?;

        Ok(Client {
            broker,
            known_queues: Some(Arc::new(known)),
        })
    }

    /// Submit `task` onto `queue`. Fails with [`Error::QueueNotFound`] if
    /// this client was built with [`Client::with_known_queues`] and `queue`
    /// isn't in that set.
    pub async fn enqueue(&self, queue: &str, task: Task) -> Result<(), Error> {
        if let Some(known) = &self.known_queues {
            if !known.contains(queue) {
                return Err(Error::QueueNotFound(queue.to_string()));
            }
        }

        let msg = TaskMessage::from_task(task)?;
        self.broker.enqueue(queue, &msg).await
    }
}

fn known_queue_set<I, S>(queues: I) -> Result<HashSet<String>, Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let known: HashSet<String> = queues.into_iter().map(Into::into).collect();
    if known.is_empty() {
        return Err(Error::QueuesEmpty);
    }
    Ok(known)
}
