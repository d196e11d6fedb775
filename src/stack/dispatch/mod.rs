mod config;
mod direct;
mod dispatcher;
mod error;
mod handler;
mod max_one;
mod policy;
mod pool;
pub mod registry;
mod submit;
mod transport;
mod unbatch;

#[cfg(test)]
mod testing;

pub use config::DispatchConfig;
pub use direct::{PassAllMessagesUpDirectly, PassRegularMessagesUpDirectly};
pub use dispatcher::MessageDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use handler::{BatchHandler, DispatchUnit, SingleMessageHandler};
pub use max_one::MaxOneThreadPerSender;
pub use policy::MessageProcessingPolicy;
pub use pool::{Task, ThreadPool, TokioThreadPool};
pub use submit::{Removal, SubmitToThreadPool};
pub use transport::{Delivery, Transport, UpHandler};
pub use unbatch::UnbatchOOBBatches;
