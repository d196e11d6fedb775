use std::{
    collections::VecDeque,
    fmt::Write,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, debug_span, trace, warn};

use super::{
    error::{DispatchError, DispatchResult},
    handler::DispatchUnit,
    policy::MessageProcessingPolicy,
    pool::ThreadPool,
    submit::SubmitToThreadPool,
    transport::Transport,
};
use crate::stack::msg::{Address, Message, MessageBatch};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    /// No drain task exists for the sender. Units may still be queued if the
    /// pool rejected the last drain task.
    Idle,
    /// A drain task is delivering and nothing waits behind it.
    Running,
    /// A drain task is delivering and `queue` holds more units.
    RunningWithPending,
}

/// How a drain task gets started for a sender leaving `Idle`.
enum Start {
    /// Nothing was queued; the task begins with this unit.
    First(DispatchUnit),
    /// Units were left queued; the caller's unit sits at this index behind
    /// them.
    Queued(usize),
}

struct Pending {
    state: RunState,
    queue: VecDeque<DispatchUnit>,
}

/// Ordering state of one sender. At most one drain task per entry exists at
/// any time; it keeps pulling queued units until it finds the queue empty, and
/// goes idle in the same critical section.
struct SenderEntry {
    sender: Address,
    multicast: bool,
    max_buffer_size: usize,
    pending: Mutex<Pending>,
    submitted: AtomicU64,
    queued: AtomicU64,
    rejected: AtomicU64,
}

impl SenderEntry {
    fn new(sender: Address, multicast: bool, max_buffer_size: usize) -> Self {
        Self {
            sender,
            multicast,
            max_buffer_size,
            pending: Mutex::new(Pending {
                state: RunState::Idle,
                queue: VecDeque::new(),
            }),
            submitted: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn enqueue(
        self: &Arc<Self>,
        unit: DispatchUnit,
        pool: &Arc<dyn ThreadPool>,
    ) -> DispatchResult<bool> {
        let start = {
            let mut pending = self.pending.lock();
            if pending.state == RunState::Idle && pending.queue.is_empty() {
                pending.state = RunState::Running;
                Start::First(unit)
            } else {
                if self.max_buffer_size > 0
                    && pending.queue.len() >= self.max_buffer_size
                {
                    return Err(DispatchError::BufferFull {
                        sender: self.sender,
                        capacity: self.max_buffer_size,
                    });
                }
                let idle = pending.state == RunState::Idle;
                pending.queue.push_back(unit);
                pending.state = RunState::RunningWithPending;
                self.queued.fetch_add(1, Ordering::Relaxed);
                if !idle {
                    return Ok(true);
                }
                // units left behind by a rejected drain task go first
                Start::Queued(pending.queue.len() - 1)
            }
        };
        self.start(start, pool)?;
        Ok(true)
    }

    /// Submits a drain task. Only called by whoever moved the entry out of
    /// `Idle`. On rejection only the caller's own unit fails: units other
    /// producers queued meanwhile stay queued for the next drain task.
    fn start(
        self: &Arc<Self>,
        start: Start,
        pool: &Arc<dyn ThreadPool>,
    ) -> DispatchResult<()> {
        let (first, own) = match start {
            Start::First(unit) => (Some(unit), None),
            Start::Queued(pos) => (None, Some(pos)),
        };
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let err = match self.submit_drain(first, pool) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        self.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(sender = %self.sender, "pool rejected drain task: {}", err);

        if self.withdraw(own) {
            if let Err(again) = self.submit_drain(None, pool) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                let waiting = self.park();
                warn!(
                    sender = %self.sender,
                    waiting,
                    "pool rejected drain task, queued units wait for the next \
                     arrival: {}",
                    again
                );
            }
        }
        Err(err)
    }

    fn submit_drain(
        self: &Arc<Self>,
        first: Option<DispatchUnit>,
        pool: &Arc<dyn ThreadPool>,
    ) -> DispatchResult<()> {
        let entry = Arc::clone(self);
        pool.execute(Box::new(move || entry.drain(first)))
    }

    /// Takes the rejected caller's unit back out of the queue and goes idle
    /// if nothing else is queued. Returns whether units are waiting.
    ///
    /// No drain task exists while this runs, so nothing was popped since the
    /// unit was pushed and `own` still points at it.
    fn withdraw(&self, own: Option<usize>) -> bool {
        let mut pending = self.pending.lock();
        if let Some(pos) = own {
            pending.queue.remove(pos);
        }
        if pending.queue.is_empty() {
            pending.state = RunState::Idle;
            false
        } else {
            true
        }
    }

    /// Goes idle keeping the queue. The next arrival starts a drain task for
    /// it. Returns the number of units left waiting.
    fn park(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.state = RunState::Idle;
        pending.queue.len()
    }

    fn drain(&self, first: Option<DispatchUnit>) {
        let span = debug_span!(
            "drain",
            sender = %self.sender,
            mcast = self.multicast
        );
        let _guard = span.enter();
        let mut next = first;
        let mut delivered = 0_usize;
        loop {
            if let Some(unit) = next.take() {
                unit.run();
                delivered += 1;
            }
            let mut pending = self.pending.lock();
            match pending.queue.pop_front() {
                Some(unit) => {
                    pending.state = if pending.queue.is_empty() {
                        RunState::Running
                    } else {
                        RunState::RunningWithPending
                    };
                    next = Some(unit);
                }
                None => {
                    pending.state = RunState::Idle;
                    trace!(delivered, "sender idle");
                    return;
                }
            }
        }
    }

    fn describe(&self) -> String {
        let (state, len) = {
            let pending = self.pending.lock();
            (pending.state, pending.queue.len())
        };
        format!(
            "{}: state={:?} pending={} submitted={} queued={} rejected={}",
            self.sender,
            state,
            len,
            self.submitted.load(Ordering::Relaxed),
            self.queued.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.queued.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }
}

/// Sender entries for one kind of destination (unicast or multicast).
struct SenderTable {
    multicast: bool,
    map: RwLock<HashMap<Address, Arc<SenderEntry>>>,
}

impl SenderTable {
    fn new(multicast: bool) -> Self {
        Self {
            multicast,
            map: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, sender: Address, max_buffer_size: usize) -> Arc<SenderEntry> {
        let existing = self.map.read().get(&sender).cloned();
        match existing {
            Some(entry) => entry,
            None => self
                .map
                .write()
                .entry(sender)
                .or_insert_with(|| {
                    Arc::new(SenderEntry::new(
                        sender,
                        self.multicast,
                        max_buffer_size,
                    ))
                })
                .clone(),
        }
    }

    fn retain(&self, members: &[Address]) {
        self.map.write().retain(|sender, _| members.contains(sender));
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn clear(&self) {
        self.map.write().clear();
    }

    fn reset(&self) {
        self.map.read().values().for_each(|entry| entry.reset());
    }

    fn dump(&self, out: &mut String) {
        for entry in self.map.read().values() {
            let _ = writeln!(out, "  {}", entry.describe());
        }
    }
}

/// Delivers regular traffic with at most one thread per sender at a time, in
/// arrival order. A unit arriving while its sender is busy is queued, and the
/// busy thread picks it up before letting go of the sender.
///
/// OOB traffic skips the ordering entirely and goes through
/// [`SubmitToThreadPool`].
pub struct MaxOneThreadPerSender {
    base: SubmitToThreadPool,
    mcasts: SenderTable,
    ucasts: SenderTable,
    max_buffer_size: usize,
}

impl MaxOneThreadPerSender {
    /// `max_buffer_size` bounds each sender's queue; 0 leaves it unbounded.
    pub fn new(transport: Arc<Transport>, max_buffer_size: usize) -> Self {
        Self {
            base: SubmitToThreadPool::new(transport),
            mcasts: SenderTable::new(true),
            ucasts: SenderTable::new(false),
            max_buffer_size,
        }
    }

    pub fn base(&self) -> &SubmitToThreadPool {
        &self.base
    }

    /// Senders with ordering state, over both tables.
    pub fn num_senders(&self) -> usize {
        self.mcasts.len() + self.ucasts.len()
    }

    fn table(&self, multicast: bool) -> &SenderTable {
        if multicast {
            &self.mcasts
        } else {
            &self.ucasts
        }
    }

    fn enqueue(
        &self,
        sender: Address,
        multicast: bool,
        unit: DispatchUnit,
    ) -> DispatchResult<bool> {
        self.table(multicast)
            .get(sender, self.max_buffer_size)
            .enqueue(unit, self.base.transport().thread_pool())
    }

    fn enqueue_message(
        &self,
        msg: Message,
        loopback: bool,
    ) -> DispatchResult<bool> {
        let Some(sender) = msg.src() else {
            trace!("dropping message without sender: {:?}", msg);
            return Ok(false);
        };
        let multicast = msg.is_multicast();
        let unit = self.base.single(msg, false, loopback);
        self.enqueue(sender, multicast, unit)
    }

    fn enqueue_batch(
        &self,
        batch: MessageBatch,
        loopback: bool,
    ) -> DispatchResult<bool> {
        if batch.is_empty() {
            return Ok(false);
        }
        let (sender, multicast) = (batch.sender(), batch.is_multicast());
        let unit = self.base.batch(batch, false, loopback);
        self.enqueue(sender, multicast, unit)
    }
}

impl MessageProcessingPolicy for MaxOneThreadPerSender {
    fn name(&self) -> &'static str {
        "max"
    }

    fn process(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        if oob {
            return self.base.process(msg, oob);
        }
        self.enqueue_message(msg, false)
    }

    fn process_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if oob {
            return self.base.process_batch(batch, oob);
        }
        self.enqueue_batch(batch, false)
    }

    fn loopback(&self, msg: Message, oob: bool) -> DispatchResult<bool> {
        if oob {
            return self.base.loopback(msg, oob);
        }
        self.enqueue_message(msg, true)
    }

    fn loopback_batch(
        &self,
        batch: MessageBatch,
        oob: bool,
    ) -> DispatchResult<bool> {
        if oob {
            return self.base.loopback_batch(batch, oob);
        }
        self.enqueue_batch(batch, true)
    }

    fn view_change(&self, members: &[Address]) {
        self.mcasts.retain(members);
        self.ucasts.retain(members);
        debug!(senders = self.num_senders(), "pruned sender tables");
    }

    fn reset(&self) {
        self.mcasts.reset();
        self.ucasts.reset();
    }

    fn destroy(&self) {
        self.mcasts.clear();
        self.ucasts.clear();
    }

    fn dump(&self) -> String {
        let mut out = String::from("mcasts:\n");
        self.mcasts.dump(&mut out);
        out.push_str("ucasts:\n");
        self.ucasts.dump(&mut out);
        out
    }
}
