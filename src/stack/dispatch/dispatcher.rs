use std::sync::Arc;

use tracing::trace;

use super::{
    config::DispatchConfig,
    error::DispatchResult,
    policy::MessageProcessingPolicy,
    registry,
    transport::Transport,
};
use crate::stack::msg::{Address, BatchMode, Message, MessageBatch};

/// Entry point for the transport's receive path: tells loopback traffic from
/// network traffic and hands it to the configured policy with the OOB flag
/// the traffic carries.
pub struct MessageDispatcher {
    transport: Arc<Transport>,
    policy: Arc<dyn MessageProcessingPolicy>,
}

impl MessageDispatcher {
    pub fn new(
        transport: Arc<Transport>,
        policy: Arc<dyn MessageProcessingPolicy>,
    ) -> Self {
        Self { transport, policy }
    }

    pub fn from_config(
        transport: Arc<Transport>,
        config: &DispatchConfig,
    ) -> DispatchResult<Self> {
        let policy = registry::from_config(transport.clone(), config)?;
        Ok(Self::new(transport, policy))
    }

    pub fn policy(&self) -> &Arc<dyn MessageProcessingPolicy> {
        &self.policy
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn receive(&self, msg: Message) -> DispatchResult<bool> {
        let oob = msg.is_oob();
        if self.transport.is_loopback(msg.src(), msg.dest()) {
            self.policy.loopback(msg, oob)
        } else {
            self.policy.process(msg, oob)
        }
    }

    /// A mixed batch is split in two; the OOB part is dispatched first. Both
    /// parts are always dispatched, and the first failure is returned.
    pub fn receive_batch(
        &self,
        mut batch: MessageBatch,
    ) -> DispatchResult<bool> {
        let loopback = self
            .transport
            .is_loopback(Some(batch.sender()), batch.dest());
        match batch.mode() {
            BatchMode::Oob => self.route_batch(batch, true, loopback),
            BatchMode::Reg => self.route_batch(batch, false, loopback),
            BatchMode::Mixed => {
                trace!("splitting mixed {:?}", batch);
                let oob = match batch.split_off_oob() {
                    Some(oob) => self.route_batch(oob, true, loopback),
                    None => Ok(false),
                };
                let regular = self.route_batch(batch, false, loopback);
                match (oob, regular) {
                    (Err(err), _) | (_, Err(err)) => Err(err),
                    (Ok(a), Ok(b)) => Ok(a || b),
                }
            }
        }
    }

    pub fn view_change(&self, members: &[Address]) {
        self.policy.view_change(members);
    }

    fn route_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
        loopback: bool,
    ) -> DispatchResult<bool> {
        if loopback {
            self.policy.loopback_batch(batch, oob)
        } else {
            self.policy.process_batch(batch, oob)
        }
    }
}
