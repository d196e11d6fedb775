//! Test doubles shared by the dispatch tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

use parking_lot::Mutex;

use super::{
    error::{DispatchError, DispatchResult},
    pool::{Task, ThreadPool},
    transport::{Delivery, Transport, UpHandler},
};
use crate::stack::msg::{Address, Message, MessageBatch};

pub(crate) const LOCAL: Address = Address::new(100);
/// Payload that makes the recorder return an error.
pub(crate) const FAIL: u32 = u32::MAX - 1;
/// Payload that makes the recorder panic.
pub(crate) const PANIC: u32 = u32::MAX;

pub(crate) fn seq_of(msg: &Message) -> u32 {
    let p = msg.payload();
    u32::from_be_bytes([p[0], p[1], p[2], p[3]])
}

/// A regular multicast message from `sender` carrying `seq`.
pub(crate) fn msg(sender: u64, seq: u32) -> Message {
    Message::builder()
        .src(Address::new(sender))
        .payload(seq.to_be_bytes().to_vec())
        .build()
}

pub(crate) fn oob_msg(sender: u64, seq: u32) -> Message {
    Message::builder()
        .src(Address::new(sender))
        .oob(true)
        .payload(seq.to_be_bytes().to_vec())
        .build()
}

pub(crate) fn ucast_msg(sender: u64, seq: u32) -> Message {
    Message::builder()
        .src(Address::new(sender))
        .dest(LOCAL)
        .payload(seq.to_be_bytes().to_vec())
        .build()
}

pub(crate) fn batch<I>(sender: u64, seqs: I, oob: bool) -> MessageBatch
where
    I: IntoIterator<Item = u32>,
{
    MessageBatch::new(Address::new(sender), None, "test").with_messages(
        seqs.into_iter().map(|seq| {
            if oob {
                oob_msg(sender, seq)
            } else {
                msg(sender, seq)
            }
        }),
    )
}

#[derive(Clone, Debug)]
pub(crate) struct Record {
    pub sender: Option<Address>,
    pub seqs: Vec<u32>,
    pub delivery: Delivery,
    pub thread: ThreadId,
}

/// Upper stack that remembers every delivery.
#[derive(Default)]
pub(crate) struct Recorder {
    records: Mutex<Vec<Record>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Every delivered seq from `sender`, in delivery order.
    pub fn seqs_of(&self, sender: u64) -> Vec<u32> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.sender == Some(Address::new(sender)))
            .flat_map(|r| r.seqs.iter().copied())
            .collect()
    }

    pub fn singles(&self) -> usize {
        self.records.lock().iter().filter(|r| !r.delivery.batched).count()
    }

    pub fn batches(&self) -> usize {
        self.records.lock().iter().filter(|r| r.delivery.batched).count()
    }

    fn record(
        &self,
        sender: Option<Address>,
        seqs: Vec<u32>,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        if seqs.contains(&PANIC) {
            panic!("upper stack blew up");
        }
        if seqs.contains(&FAIL) {
            anyhow::bail!("upper stack refused delivery");
        }
        self.records.lock().push(Record {
            sender,
            seqs,
            delivery,
            thread: thread::current().id(),
        });
        Ok(())
    }
}

impl UpHandler for Recorder {
    fn pass_message_up(
        &self,
        msg: Message,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        self.record(msg.src(), vec![seq_of(&msg)], delivery)
    }

    fn pass_batch_up(
        &self,
        batch: MessageBatch,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        let seqs = batch.iter().map(seq_of).collect();
        self.record(Some(batch.sender()), seqs, delivery)
    }
}

/// Runs every task on the submitting thread.
#[derive(Default)]
pub(crate) struct InlinePool {
    executed: AtomicUsize,
}

impl InlinePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

impl ThreadPool for InlinePool {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        task();
        Ok(())
    }
}

/// Rejects everything.
#[derive(Default)]
pub(crate) struct FailingPool {
    attempts: AtomicUsize,
}

impl FailingPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ThreadPool for FailingPool {
    fn execute(&self, _task: Task) -> DispatchResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::Rejected("failing pool".into()))
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// Parks tasks until the test runs them.
#[derive(Default)]
pub(crate) struct DeferredPool {
    tasks: Mutex<VecDeque<Task>>,
    reject: AtomicUsize,
    hook: Mutex<Option<Hook>>,
}

impl DeferredPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects the next `n` submissions.
    pub fn reject_next(&self, n: usize) {
        self.reject.store(n, Ordering::SeqCst);
    }

    /// Runs `hook` inside the next `execute`, before it decides.
    pub fn on_next_execute<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn run_one(&self) -> bool {
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl ThreadPool for DeferredPool {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        let reject = self.reject.load(Ordering::SeqCst);
        if reject > 0 {
            self.reject.store(reject - 1, Ordering::SeqCst);
            return Err(DispatchError::Rejected(
                "deferred pool told to reject".into(),
            ));
        }
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

pub(crate) fn transport(
    pool: Arc<dyn ThreadPool>,
) -> (Arc<Transport>, Arc<Recorder>) {
    let up = Recorder::new();
    let transport = Transport::builder()
        .local_addr(LOCAL)
        .cluster("test")
        .up(up.clone())
        .pool(pool)
        .build();
    (Arc::new(transport), up)
}
