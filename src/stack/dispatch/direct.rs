use std::sync::Arc;

use super::{
    error::DispatchResult, policy::MessageProcessingPolicy,
    submit::SubmitToThreadPool, transport::Transport,
};
use crate::stack::msg::{Message, MessageBatch};

/// Delivers everything on the calling thread; the pool is never touched.
///
/// Meant for tracking down wire format problems, where a single call stack
/// from the socket read to the application callback is worth more than any
/// concurrency.
pub struct PassAllMessagesUpDirectly {
    base: SubmitToThreadPool,
}

impl PassAllMessagesUpDirectly {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            base: SubmitToThreadPool::new(transport),
        }
    }

    fn run_message(
        &self,
        msg: Message,
        oob: bool,
        loopback: bool,
    ) -> DispatchResult<bool> {
        self.base.single(msg, oob, loopback).run();
        Ok(true)
    }

    fn run_batch(
        &self,
        mut batch: MessageBatch,
        oob: bool,
        loopback: bool,
    ) -> DispatchResult<bool> {
        if batch.is_empty() {
            return Ok(false);
        }
        if oob {
            let removal = self.base.remove_and_dispatch_non_batchable(
                &mut batch,
                oob,
                loopback,
                |unit| {
                    unit.run();
                    Ok(())
                },
            );
            if removal.emptied {
                return Ok(true);
            }
        }
        self.base.batch(batch, oob, loopback).run();
        Ok(true)
    }
}

impl MessageProcessingPolicy for PassAllMessagesUpDirectly {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        self.run_message(msg, oob, false)
    }

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        self.run_batch(batch, oob, false)
    }

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        self.run_message(msg, oob, true)
    }

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        self.run_batch(batch, oob, true)
    }
}

/// Delivers regular traffic on the calling thread and leaves OOB traffic to
/// [`SubmitToThreadPool`], saving a thread hand-off for the common case.
pub struct PassRegularMessagesUpDirectly {
    base: SubmitToThreadPool,
}

impl PassRegularMessagesUpDirectly {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            base: SubmitToThreadPool::new(transport),
        }
    }

    pub fn base(&self) -> &SubmitToThreadPool {
        &self.base
    }

    fn run_batch(
        &self,
        batch: MessageBatch,
        loopback: bool,
    ) -> DispatchResult<bool> {
        if batch.is_empty() {
            return Ok(false);
        }
        self.base.batch(batch, false, loopback).run();
        Ok(true)
    }
}

impl MessageProcessingPolicy for PassRegularMessagesUpDirectly {
    fn name(&self) -> &'static str {
        "direct-regular"
    }

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        if oob {
            return self.base.process(msg, oob);
        }
        self.base.single(msg, false, false).run();
        Ok(true)
    }

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if oob {
            return self.base.process_batch(batch, oob);
        }
        self.run_batch(batch, false)
    }

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        if oob {
            return self.base.loopback(msg, oob);
        }
        self.base.single(msg, false, true).run();
        Ok(true)
    }

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if oob {
            return self.base.loopback_batch(batch, oob);
        }
        self.run_batch(batch, true)
    }
}
