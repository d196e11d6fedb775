use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use clap::Parser;
use courier::stack::{
    dispatch::{
        Delivery, DispatchConfig, DispatchError, MessageDispatcher,
        TokioThreadPool, Transport, UpHandler,
    },
    msg::{Address, Message, MessageBatch},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

/// Pushes synthetic traffic from a set of senders through one message
/// processing policy and reports what came out the top.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Policy name: submit, max, direct, direct-regular or unbatch.
    #[arg(long, default_value = "max")]
    policy: String,
    #[arg(long, default_value_t = 4)]
    senders: u64,
    /// Messages sent by each sender.
    #[arg(long, default_value_t = 10_000)]
    messages: u32,
    /// Share of messages flagged OOB, between 0 and 1.
    #[arg(long, default_value_t = 0.1)]
    oob_ratio: f64,
    /// OOB batches above this size are split by the unbatch policy.
    #[arg(long, default_value_t = 0)]
    max_size: usize,
    /// Messages per batch; 1 sends single messages.
    #[arg(long, default_value_t = 1)]
    batch: usize,
    #[arg(long, default_value_t = 0)]
    max_buffer_size: usize,
    #[arg(long, default_value_t = 200)]
    pool_capacity: usize,
}

#[derive(Default)]
struct Counts {
    regular: usize,
    oob: usize,
    out_of_order: usize,
    last: Option<u32>,
}

/// Top of the stack for the demo: counts deliveries per sender and notes
/// regular messages that overtook an earlier one.
#[derive(Default)]
struct Sink {
    senders: Mutex<HashMap<Address, Counts>>,
    delivered: AtomicUsize,
}

impl Sink {
    fn record(&self, sender: Address, seq: u32, oob: bool) {
        let mut senders = self.senders.lock();
        let counts = senders.entry(sender).or_default();
        if oob {
            counts.oob += 1;
        } else {
            counts.regular += 1;
            if counts.last.is_some_and(|last| last > seq) {
                counts.out_of_order += 1;
            }
            counts.last = Some(seq);
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

fn seq_of(msg: &Message) -> u32 {
    msg.payload()
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .unwrap_or_default()
}

impl UpHandler for Sink {
    fn pass_message_up(
        &self,
        msg: Message,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        let sender = msg
            .src()
            .ok_or_else(|| anyhow::anyhow!("message without sender"))?;
        self.record(sender, seq_of(&msg), delivery.oob);
        Ok(())
    }

    fn pass_batch_up(
        &self,
        batch: MessageBatch,
        delivery: Delivery,
    ) -> anyhow::Result<()> {
        for msg in batch.iter() {
            self.record(batch.sender(), seq_of(msg), delivery.oob);
        }
        Ok(())
    }
}

fn send(dispatcher: &MessageDispatcher, args: &Args, sender: u64) -> usize {
    let mut rng = rand::thread_rng();
    let src = Address::new(sender);
    let mut accepted = 0;
    let mut pending: Vec<Message> = Vec::with_capacity(args.batch);
    let mut flush = |pending: &mut Vec<Message>| {
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        let result = if count == 1 {
            dispatcher.receive(pending.remove(0))
        } else {
            let cluster = dispatcher.transport().cluster().clone();
            let batch = MessageBatch::new(src, None, cluster)
                .with_messages(pending.drain(..));
            dispatcher.receive_batch(batch)
        };
        match result {
            Ok(_) => accepted += count,
            Err(DispatchError::Rejected(reason)) => {
                warn!(%src, count, "dropped by pool: {}", reason)
            }
            Err(err) => warn!(%src, count, "dispatch failed: {}", err),
        }
    };

    let mut pending_oob = false;
    for seq in 0..args.messages {
        let oob = rng.gen_bool(args.oob_ratio.clamp(0.0, 1.0));
        if oob != pending_oob {
            flush(&mut pending);
            pending_oob = oob;
        }
        pending.push(
            Message::builder()
                .src(src)
                .oob(oob)
                .payload(Bytes::copy_from_slice(&seq.to_be_bytes()))
                .build(),
        );
        if pending.len() >= args.batch.max(1) {
            flush(&mut pending);
        }
    }
    flush(&mut pending);
    accepted
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Arc::new(Args::parse());
    let config = DispatchConfig::builder()
        .policy(args.policy.as_str())
        .max_size(args.max_size)
        .max_buffer_size(args.max_buffer_size)
        .pool_capacity(args.pool_capacity)
        .build();

    let sink = Arc::new(Sink::default());
    let pool = TokioThreadPool::current(config.pool_capacity)?;
    let transport = Transport::builder()
        .local_addr(Address::new(0))
        .cluster("courier-demo")
        .up(sink.clone())
        .pool(Arc::new(pool))
        .build();
    let dispatcher = Arc::new(MessageDispatcher::from_config(
        Arc::new(transport),
        &config,
    )?);
    info!(
        policy = dispatcher.policy().name(),
        senders = args.senders,
        "starting"
    );

    let started = Instant::now();
    let producers: Vec<_> = (1..=args.senders)
        .map(|sender| {
            let (dispatcher, args) = (dispatcher.clone(), args.clone());
            thread::spawn(move || send(&dispatcher, &args, sender))
        })
        .collect();
    let mut accepted = 0;
    for producer in producers {
        accepted += producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    }

    let settled = tokio::time::timeout(Duration::from_secs(30), async {
        while sink.delivered.load(Ordering::Relaxed) < accepted {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if settled.is_err() {
        warn!(
            accepted,
            delivered = sink.delivered.load(Ordering::Relaxed),
            "timed out waiting for deliveries"
        );
    }

    info!(
        accepted,
        delivered = sink.delivered.load(Ordering::Relaxed),
        elapsed = ?started.elapsed(),
        "done"
    );
    let mut senders: Vec<_> = sink.senders.lock().drain().collect();
    senders.sort_by_key(|(addr, _)| addr.id());
    for (addr, counts) in senders {
        info!(
            sender = %addr,
            regular = counts.regular,
            oob = counts.oob,
            out_of_order = counts.out_of_order,
            "delivered"
        );
    }
    print!("{}", dispatcher.policy().dump());
    Ok(())
}
