use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{error, trace, warn};

use super::{
    pool::Task,
    transport::{Delivery, UpHandler},
};
use crate::stack::msg::{Address, Message, MessageBatch};

/// Delivers one message to the upper stack.
pub struct SingleMessageHandler {
    msg: Message,
    oob: bool,
    loopback: bool,
    up: Arc<dyn UpHandler>,
}

impl SingleMessageHandler {
    pub fn new(
        msg: Message,
        oob: bool,
        loopback: bool,
        up: Arc<dyn UpHandler>,
    ) -> Self {
        Self {
            msg,
            oob,
            loopback,
            up,
        }
    }

    /// Returns whether the upper stack accepted the message.
    pub fn run(self) -> bool {
        let delivery = Delivery {
            oob: self.oob,
            multicast: self.msg.is_multicast(),
            batched: false,
        };
        let sender = self.msg.src();
        trace!(?sender, loopback = self.loopback, "passing up {:?}", self.msg);
        let (up, msg) = (self.up, self.msg);
        contain(sender, "message", move || up.pass_message_up(msg, delivery))
    }
}

/// Delivers a whole batch to the upper stack in one call, so its messages are
/// handled by one thread in order.
pub struct BatchHandler {
    batch: MessageBatch,
    oob: bool,
    loopback: bool,
    up: Arc<dyn UpHandler>,
}

impl BatchHandler {
    pub fn new(
        batch: MessageBatch,
        oob: bool,
        loopback: bool,
        up: Arc<dyn UpHandler>,
    ) -> Self {
        Self {
            batch,
            oob,
            loopback,
            up,
        }
    }

    pub fn run(self) -> bool {
        if self.batch.is_empty() {
            return true;
        }
        let delivery = Delivery {
            oob: self.oob,
            multicast: self.batch.is_multicast(),
            batched: true,
        };
        let sender = Some(self.batch.sender());
        trace!(loopback = self.loopback, "passing up {:?}", self.batch);
        let (up, batch) = (self.up, self.batch);
        contain(sender, "batch", move || up.pass_batch_up(batch, delivery))
    }
}

/// A runnable delivery of one message or one batch.
pub enum DispatchUnit {
    Single(SingleMessageHandler),
    Batch(BatchHandler),
}

impl DispatchUnit {
    pub fn is_oob(&self) -> bool {
        match self {
            DispatchUnit::Single(h) => h.oob,
            DispatchUnit::Batch(h) => h.oob,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, DispatchUnit::Batch(_))
    }

    /// Runs the delivery on the calling thread. Never panics on behalf of
    /// the upper stack.
    pub fn run(self) -> bool {
        match self {
            DispatchUnit::Single(h) => h.run(),
            DispatchUnit::Batch(h) => h.run(),
        }
    }

    pub fn into_task(self) -> Task {
        Box::new(move || {
            self.run();
        })
    }
}

impl From<SingleMessageHandler> for DispatchUnit {
    fn from(handler: SingleMessageHandler) -> Self {
        DispatchUnit::Single(handler)
    }
}

impl From<BatchHandler> for DispatchUnit {
    fn from(handler: BatchHandler) -> Self {
        DispatchUnit::Batch(handler)
    }
}

fn contain<F>(sender: Option<Address>, what: &str, deliver: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(deliver)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(?sender, "failed delivering {}: {:#}", what, err);
            false
        }
        Err(payload) => {
            error!(
                ?sender,
                "upper stack panicked delivering {}: {}",
                what,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic>"
    }
}
