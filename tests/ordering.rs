use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use courier::stack::{
    dispatch::{
        Delivery, MaxOneThreadPerSender, MessageDispatcher,
        MessageProcessingPolicy, TokioThreadPool, Transport, UnbatchOOBBatches,
        UpHandler,
    },
    msg::{Address, Message, MessageBatch},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;

const LOCAL: Address = Address::new(1000);

fn seq_of(msg: &Message) -> u32 {
    let p = msg.payload();
    u32::from_be_bytes([p[0], p[1], p[2], p[3]])
}

fn message(sender: u64, seq: u32, oob: bool) -> Message {
    Message::builder()
        .src(Address::new(sender))
        .oob(oob)
        .payload(seq.to_be_bytes().to_vec())
        .build()
}

#[derive(Default)]
struct SenderLog {
    busy: AtomicBool,
    seqs: Mutex<Vec<u32>>,
}

/// Records delivery order per sender and catches overlapping regular
/// deliveries for the same sender.
#[derive(Default)]
struct Tracker {
    senders: Mutex<HashMap<Address, Arc<SenderLog>>>,
    overlaps: AtomicUsize,
    delivered: AtomicUsize,
}

impl Tracker {
    fn log(&self, sender: Address) -> Arc<SenderLog> {
        self.senders.lock().entry(sender).or_default().clone()
    }

    fn deliver(&self, sender: Address, seqs: Vec<u32>, oob: bool) {
        let log = self.log(sender);
        if !oob && log.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if rand::thread_rng().gen_bool(0.05) {
            thread::sleep(Duration::from_micros(200));
        }
        let n = seqs.len();
        log.seqs.lock().extend(seqs);
        if !oob {
            log.busy.store(false, Ordering::SeqCst);
        }
        self.delivered.fetch_add(n, Ordering::SeqCst);
    }

    fn seqs(&self, sender: u64) -> Vec<u32> {
        self.log(Address::new(sender)).seqs.lock().clone()
    }

    async fn wait_for(&self, total: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.delivered.load(Ordering::SeqCst) < total {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("deliveries did not complete");
    }
}

impl UpHandler for Tracker {
    fn pass_message_up(
        &self,
        msg: Message,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        let sender = msg.src().expect("test messages carry a sender");
        self.deliver(sender, vec![seq_of(&msg)], delivery.oob);
        Ok(())
    }

    fn pass_batch_up(
        &self,
        batch: MessageBatch,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        let seqs = batch.iter().map(seq_of).collect();
        self.deliver(batch.sender(), seqs, delivery.oob);
        Ok(())
    }
}

fn setup(capacity: usize) -> (Arc<Transport>, Arc<Tracker>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let tracker = Arc::new(Tracker::default());
    let pool = TokioThreadPool::current(capacity).unwrap();
    let transport = Transport::builder()
        .local_addr(LOCAL)
        .cluster("ordering")
        .up(tracker.clone())
        .pool(Arc::new(pool))
        .build();
    (Arc::new(transport), tracker)
}

/// Sends `count` regular messages from `sender`, mixing single messages with
/// small batches.
fn produce(dispatcher: &MessageDispatcher, sender: u64, count: u32) {
    let mut seq = 0;
    while seq < count {
        if seq % 7 == 3 && seq + 3 <= count {
            let messages = (seq..seq + 3).map(|s| message(sender, s, false));
            let src = Address::new(sender);
            let batch = MessageBatch::new(src, None, "ordering")
                .with_messages(messages);
            dispatcher.receive_batch(batch).unwrap();
            seq += 3;
        } else {
            dispatcher.receive(message(sender, seq, false)).unwrap();
            seq += 1;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn regular_delivery_is_fifo_per_sender() {
    const SENDERS: u64 = 8;
    const PER_SENDER: u32 = 500;

    let (transport, tracker) = setup(64);
    let policy = Arc::new(MaxOneThreadPerSender::new(transport.clone(), 0));
    let dispatcher = Arc::new(MessageDispatcher::new(transport, policy));

    let producers: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || produce(&dispatcher, sender, PER_SENDER))
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    tracker.wait_for((SENDERS as usize) * (PER_SENDER as usize)).await;

    assert!(tracker.overlaps.load(Ordering::SeqCst) == 0);
    for sender in 0..SENDERS {
        assert!(tracker.seqs(sender) == (0..PER_SENDER).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sustained_oob_load_completes() {
    const MESSAGES: u32 = 2000;

    let (transport, tracker) = setup(10_000);
    let policy: Arc<dyn MessageProcessingPolicy> =
        Arc::new(MaxOneThreadPerSender::new(transport.clone(), 0));
    let dispatcher = MessageDispatcher::new(transport, policy);

    for seq in 0..MESSAGES {
        dispatcher.receive(message(1, seq, true)).unwrap();
        // regular traffic from the same sender runs alongside
        dispatcher.receive(message(2, seq, false)).unwrap();
    }

    tracker.wait_for(2 * MESSAGES as usize).await;

    let mut oob = tracker.seqs(1);
    oob.sort_unstable();
    assert!(oob == (0..MESSAGES).collect::<Vec<_>>());
    assert!(tracker.seqs(2) == (0..MESSAGES).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unbatched_oob_messages_all_arrive() {
    let (transport, tracker) = setup(1000);
    let policy = Arc::new(UnbatchOOBBatches::new(transport.clone(), 5, 0));
    let dispatcher = MessageDispatcher::new(transport, policy);

    for round in 0..20_u32 {
        let batch = MessageBatch::new(Address::new(3), None, "ordering")
            .with_messages((0..8).map(|i| message(3, round * 8 + i, true)));
        dispatcher.receive_batch(batch).unwrap();
    }

    tracker.wait_for(160).await;

    let mut seqs = tracker.seqs(3);
    seqs.sort_unstable();
    assert!(seqs == (0..160).collect::<Vec<_>>());
}
