use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    error::{DispatchError, DispatchResult},
    handler::{BatchHandler, DispatchUnit, SingleMessageHandler},
    policy::MessageProcessingPolicy,
    transport::Transport,
};
use crate::stack::msg::{Message, MessageBatch};

/// Outcome of peeling non-batchable messages out of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Removal {
    /// Messages taken out of the batch.
    pub removed: usize,
    /// Of those, how many could not be dispatched.
    pub failed: usize,
    /// Whether the batch was left empty.
    pub emptied: bool,
}

impl Removal {
    pub fn any(&self) -> bool {
        self.removed > 0
    }

    fn check(&self) -> DispatchResult<()> {
        if self.failed == 0 {
            Ok(())
        } else {
            Err(DispatchError::Rejected(format!(
                "{} of {} non-batchable messages could not be dispatched",
                self.failed, self.removed
            )))
        }
    }
}

/// Hands every message and every batch to the pool as one unit of work.
/// Regular loopback traffic is delivered on the calling thread.
///
/// Also the base the other policies delegate to.
pub struct SubmitToThreadPool {
    transport: Arc<Transport>,
}

impl SubmitToThreadPool {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn single(
        &self,
        msg: Message,
        oob: bool,
        loopback: bool,
    ) -> DispatchUnit {
        let up = self.transport.up().clone();
        SingleMessageHandler::new(msg, oob, loopback, up).into()
    }

    pub fn batch(
        &self,
        batch: MessageBatch,
        oob: bool,
        loopback: bool,
    ) -> DispatchUnit {
        BatchHandler::new(batch, oob, loopback, self.transport.up().clone())
            .into()
    }

    pub fn submit(&self, unit: DispatchUnit) -> DispatchResult<()> {
        self.transport.thread_pool().execute(unit.into_task())
    }

    /// Takes every message flagged `dont_batch` out of `batch` and hands each
    /// to `dispatch` as a unit of its own, in batch order. A failed dispatch
    /// is counted, not propagated, so the rest of the batch still goes out.
    pub fn remove_and_dispatch_non_batchable<F>(
        &self,
        batch: &mut MessageBatch,
        oob: bool,
        loopback: bool,
        mut dispatch: F,
    ) -> Removal
    where
        F: FnMut(DispatchUnit) -> DispatchResult<()>,
    {
        let removed = batch.remove_if(Message::dont_batch);
        let mut removal = Removal {
            removed: removed.len(),
            failed: 0,
            emptied: false,
        };
        for msg in removed {
            if let Err(err) = dispatch(self.single(msg, oob, loopback)) {
                warn!(
                    sender = %batch.sender(),
                    "dispatching non-batchable message: {}",
                    err
                );
                removal.failed += 1;
            }
        }
        removal.emptied = batch.is_empty();
        if removal.any() {
            debug!(
                sender = %batch.sender(),
                ?removal,
                "peeled non-batchable messages"
            );
        }
        removal
    }

    fn submit_batch(
        &self,
        mut batch: MessageBatch,
        oob: bool,
        loopback: bool,
    ) -> DispatchResult<bool> {
        if batch.is_empty() {
            return Ok(false);
        }
        let removal = if oob {
            self.remove_and_dispatch_non_batchable(
                &mut batch,
                oob,
                loopback,
                |unit| self.submit(unit),
            )
        } else {
            Removal::default()
        };
        if !removal.emptied {
            self.submit(self.batch(batch, oob, loopback))?;
        }
        removal.check()?;
        Ok(true)
    }
}

impl MessageProcessingPolicy for SubmitToThreadPool {
    fn name(&self) -> &'static str {
        "submit"
    }

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        self.submit(self.single(msg, oob, false))?;
        Ok(true)
    }

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        self.submit_batch(batch, oob, false)
    }

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        if oob {
            self.submit(self.single(msg, true, true))?;
        } else {
            self.single(msg, false, true).run();
        }
        Ok(true)
    }

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if oob {
            return self.submit_batch(batch, true, true);
        }
        if batch.is_empty() {
            return Ok(false);
        }
        self.batch(batch, false, true).run();
        Ok(true)
    }
}
