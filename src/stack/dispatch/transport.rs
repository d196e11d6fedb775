use std::sync::Arc;

use typed_builder::TypedBuilder;

use super::pool::ThreadPool;
use crate::stack::msg::{Address, Message, MessageBatch};

/// How a message or batch reached the upper stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub oob: bool,
    pub multicast: bool,
    /// Delivered as part of a batch.
    pub batched: bool,
}

/// The bottom of the protocol stack, which receives everything this layer
/// dispatches. Errors and panics are contained by the dispatch unit that made
/// the call.
pub trait UpHandler: Send + Sync {
    fn pass_message_up(
        &self,
        msg: Message,
        delivery: Delivery,
    ) -> anyhow::Result<()>;

    fn pass_batch_up(
        &self,
        batch: MessageBatch,
        delivery: Delivery,
    ) -> anyhow::Result<()>;
}

/// What a policy needs from the transport it serves.
#[derive(TypedBuilder)]
pub struct Transport {
    local_addr: Address,
    #[builder(setter(into))]
    cluster: Arc<str>,
    up: Arc<dyn UpHandler>,
    pool: Arc<dyn ThreadPool>,
}

impl Transport {
    pub fn local_addr(&self) -> Address {
        self.local_addr
    }

    pub fn cluster(&self) -> &Arc<str> {
        &self.cluster
    }

    pub fn up(&self) -> &Arc<dyn UpHandler> {
        &self.up
    }

    pub fn thread_pool(&self) -> &Arc<dyn ThreadPool> {
        &self.pool
    }

    /// Whether traffic from `src` to `dest` never left this node: sent by us,
    /// to us or to everyone.
    pub fn is_loopback(
        &self,
        src: Option<Address>,
        dest: Option<Address>,
    ) -> bool {
        src == Some(self.local_addr)
            && dest.map_or(true, |dest| dest == self.local_addr)
    }
}
