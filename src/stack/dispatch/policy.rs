use super::error::DispatchResult;
use crate::stack::msg::{Address, Message, MessageBatch};

/// Decides on which thread a message or batch is delivered to the upper
/// stack.
///
/// `process` receives traffic that came in over the network, `loopback`
/// traffic this node sent to itself. `Ok(true)` means delivery has been fully
/// arranged, inline or on the pool; `Ok(false)` means there was nothing this
/// policy could deliver (an empty batch, a message without a sender). None of
/// the methods block beyond handing work over.
pub trait MessageProcessingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool>;

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool>;

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool>;

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool>;

    /// Called with the members of each new view.
    fn view_change(&self, _members: &[Address]) {}

    /// Zeroes statistics.
    fn reset(&self) {}

    /// Drops all per-sender state.
    fn destroy(&self) {}

    /// Human readable internal state, for diagnostics.
    fn dump(&self) -> String {
        String::new()
    }
}
