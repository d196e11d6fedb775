mod batch;
mod message;

pub use batch::{BatchMode, MessageBatch};
pub use message::{Address, Message};
