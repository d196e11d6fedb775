use std::{mem, sync::Arc};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::stack::msg::{Address, Message};

type SenderQueue = Arc<Mutex<Vec<Message>>>;

/// Accumulates messages per sender until someone drains them.
///
/// Producers for different senders only share the map's read lock. A drain
/// swaps the sender's queue out in one step, so a concurrent `add` either
/// lands in the drained batch or in the next one, never in neither.
#[derive(Default)]
pub struct MessageCache {
    map: RwLock<HashMap<Address, SenderQueue>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sender: Address, msg: Message) {
        let existing = self.map.read().get(&sender).cloned();
        let queue = match existing {
            Some(queue) => queue,
            None => self.map.write().entry(sender).or_default().clone(),
        };
        queue.lock().push(msg);
    }

    /// Removes and returns everything queued for `sender`, oldest first.
    /// Drains of the same sender must not run concurrently.
    pub fn drain(&self, sender: &Address) -> Option<Vec<Message>> {
        let queue = self.map.read().get(sender).cloned()?;
        let msgs = mem::take(&mut *queue.lock());
        if msgs.is_empty() {
            None
        } else {
            Some(msgs)
        }
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }

    /// Total number of queued messages across all senders.
    pub fn size(&self) -> usize {
        self.map.read().values().map(|q| q.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn senders(&self) -> Vec<Address> {
        self.map.read().keys().copied().collect()
    }
}
