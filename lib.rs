//! A distributed background-task queue backed by a Redis-family store:
//! atomic enqueue/dequeue/scheduled-promotion via server-side scripts, a
//! per-queue worker pipeline, and a dispatch layer that resolves handlers by
//! task type, retries on failure, and isolates handler panics.

mod broker;
mod client;
mod error;
mod id;
mod message;
mod mux;
mod qsync;
mod script_dequeue;
mod script_enqueue_pending;
mod script_enqueue_scheduled;
mod script_promote;
mod server;
mod shutdown;
mod task;
mod worker;

pub use broker::Broker;
pub use client::Client;
pub use error::Error;
pub use message::{TaskInfo, TaskMessage};
pub use mux::{Handler, Mux};
pub use qsync::Qsync;
pub use server::{Server, ServerBuilder, CRITICAL, DEFAULT, LOWER};
pub use task::Task;
