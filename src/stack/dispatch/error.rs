use thiserror::Error;
use tokio::runtime::TryCurrentError;

use crate::stack::msg::Address;

/// Errors surfaced by message processing policies and worker pools.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The worker pool refused a unit of work
    #[error("thread pool rejected task: {0}")]
    Rejected(String),

    /// The sender's pending queue is at capacity
    #[error("pending queue for sender {sender} is full ({capacity} units)")]
    BufferFull { sender: Address, capacity: usize },

    /// No policy is registered under this name
    #[error("unknown message processing policy: {0}")]
    UnknownPolicy(String),

    /// A tokio pool was requested outside of a runtime
    #[error("no async runtime found: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
