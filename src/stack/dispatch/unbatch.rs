use std::sync::Arc;

use tracing::debug;

use super::{
    error::DispatchResult, max_one::MaxOneThreadPerSender,
    policy::MessageProcessingPolicy, transport::Transport,
};
use crate::stack::msg::{Address, Message, MessageBatch};

/// [`MaxOneThreadPerSender`] that breaks OOB batches with more than
/// `max_size` messages into one pool task per message, so no single task
/// holds a worker for too long. A `max_size` of 0 turns this off.
pub struct UnbatchOOBBatches {
    base: MaxOneThreadPerSender,
    max_size: usize,
}

impl UnbatchOOBBatches {
    pub fn new(
        transport: Arc<Transport>,
        max_size: usize,
        max_buffer_size: usize,
    ) -> Self {
        Self {
            base: MaxOneThreadPerSender::new(transport, max_buffer_size),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn base(&self) -> &MaxOneThreadPerSender {
        &self.base
    }

    fn unbatch(&self, mut batch: MessageBatch) -> DispatchResult<bool> {
        let submit = self.base.base();
        let total = batch.len();
        let mut rejected = 0_usize;
        let mut first_err = None;
        for msg in batch.drain() {
            if let Err(err) = submit.submit(submit.single(msg, true, false)) {
                rejected += 1;
                first_err.get_or_insert(err);
            }
        }
        debug!(
            sender = %batch.sender(),
            total,
            rejected,
            "unbatched OOB batch"
        );
        match first_err {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }
}

impl MessageProcessingPolicy for UnbatchOOBBatches {
    fn name(&self) -> &'static str {
        "unbatch"
    }

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        self.base.process(msg, oob)
    }

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if !oob || self.max_size == 0 || batch.len() <= self.max_size {
            return self.base.process_batch(batch, oob);
        }
        self.unbatch(batch)
    }

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        self.base.loopback(msg, oob)
    }

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        self.base.loopback_batch(batch, oob)
    }

    fn view_change(&self, members: &[Address]) {
        self.base.view_change(members)
    }

    fn reset(&self) {
        self.base.reset()
    }

    fn destroy(&self) {
        self.base.destroy()
    }

    fn dump(&self) -> String {
        format!("max_size={}\n{}", self.max_size, self.base.dump())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::dispatch::{
        error::DispatchError,
        testing::{batch, transport, DeferredPool, InlinePool, Recorder},
    };

    fn setup(
        max_size: usize,
    ) -> (Arc<InlinePool>, Arc<Recorder>, UnbatchOOBBatches) {
        let pool = InlinePool::new();
        let (transport, up) = transport(pool.clone());
        (pool, up, UnbatchOOBBatches::new(transport, max_size, 0))
    }

    #[test]
    fn large_oob_batch_becomes_single_units() {
        let (pool, up, policy) = setup(5);

        assert!(policy.process_batch(batch(1, 1..=8, true), true).unwrap());

        assert!(pool.executed() == 8);
        assert!(up.singles() == 8 && up.batches() == 0);
        assert!(up.records().iter().all(|r| r.delivery.oob));
    }

    #[test]
    fn small_oob_batch_stays_whole() {
        let (pool, up, policy) = setup(5);

        policy.process_batch(batch(1, 1..=5, true), true).unwrap();

        assert!(pool.executed() == 1);
        assert!(up.batches() == 1 && up.singles() == 0);
    }

    #[test]
    fn regular_batches_are_never_split() {
        let (pool, up, policy) = setup(5);

        policy.process_batch(batch(1, 1..=8, false), false).unwrap();

        assert!(pool.executed() == 1);
        assert!(up.batches() == 1 && up.singles() == 0);
        assert!(up.seqs_of(1) == (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn zero_disables_splitting() {
        let (pool, up, policy) = setup(0);

        policy.process_batch(batch(1, 1..=50, true), true).unwrap();

        assert!(pool.executed() == 1);
        assert!(up.batches() == 1);
    }

    #[test]
    fn rejected_units_are_reported() {
        let pool = DeferredPool::new();
        let (transport, _) = transport(pool.clone());
        let policy = UnbatchOOBBatches::new(transport, 2, 0);
        pool.reject_next(1);

        let result = policy.process_batch(batch(1, 1..=4, true), true);

        assert!(matches!(result, Err(DispatchError::Rejected(_))));
        assert!(pool.len() == 3);
    }
}
