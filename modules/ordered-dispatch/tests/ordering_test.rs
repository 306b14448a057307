//! FIFO-per-key delivery, including under concurrent producers racing the
//! worker's drain-and-retire step.

mod support;

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use ordered_dispatch::{Scheduler, ThreadKey, TokioBlockingPool};
use support::{eventually, Recorder, SETTLE};

type Event = (u32, u64);

fn recording_scheduler<K>(recorder: &Recorder<Event>) -> Scheduler<K, u8, Event>
where
    K: ordered_dispatch::OrderingKey,
{
    let recorder = recorder.clone();
    Scheduler::new(
        move |_handlers: &[u8], event: &Event, _asynchronous: bool| recorder.record(event),
        TokioBlockingPool::current().unwrap(),
    )
}

fn sequences_by_stream(events: &[Event]) -> HashMap<u32, Vec<u64>> {
    let mut by_stream: HashMap<u32, Vec<u64>> = HashMap::new();
    for (stream, seq) in events {
        by_stream.entry(*stream).or_default().push(*seq);
    }
    by_stream
}

// =========================================================================
// Single producer
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_key_is_delivered_in_submission_order() {
    let recorder = Recorder::new();
    let scheduler = recording_scheduler::<&'static str>(&recorder);

    for seq in 0..500 {
        scheduler.submit("conn-1", vec![1], (1, seq)).unwrap();
    }

    assert!(eventually(SETTLE, || recorder.len() == 500).await);
    let seqs: Vec<u64> = recorder.events().into_iter().map(|(_, s)| s).collect();
    assert_eq!(seqs, (0..500).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_keys_each_keep_their_own_order() {
    let recorder = Recorder::new();
    let scheduler = recording_scheduler::<u32>(&recorder);

    for seq in 0..200 {
        for stream in 0..6 {
            scheduler.submit(stream, vec![1], (stream, seq)).unwrap();
        }
    }

    assert!(eventually(SETTLE, || recorder.len() == 1_200).await);
    let by_stream = sequences_by_stream(&recorder.events());
    assert_eq!(by_stream.len(), 6);
    for (stream, seqs) in by_stream {
        assert_eq!(seqs, (0..200).collect::<Vec<_>>(), "stream {stream} out of order");
    }
}

// =========================================================================
// Concurrent producers on one key
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_lose_nothing_while_worker_retires() {
    const PRODUCERS: u32 = 8;
    const PER_PRODUCER: u64 = 500;

    let recorder = Recorder::new();
    let scheduler = recording_scheduler::<&'static str>(&recorder);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    scheduler.submit("shared", vec![1], (producer, seq)).unwrap();
                    // Pauses let the worker drain to empty and retire mid-run.
                    if seq % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let total = (PRODUCERS as u64 * PER_PRODUCER) as usize;
    assert!(eventually(SETTLE, || recorder.len() >= total && scheduler.active_keys().is_empty()).await);

    let events = recorder.events();
    assert_eq!(events.len(), total, "duplicate or lost deliveries");
    let unique: HashSet<Event> = events.iter().copied().collect();
    assert_eq!(unique.len(), total, "an event was delivered twice");

    for (producer, seqs) in sequences_by_stream(&events) {
        assert_eq!(
            seqs,
            (0..PER_PRODUCER).collect::<Vec<_>>(),
            "producer {producer} observed out of order"
        );
    }

    let snap = scheduler.snapshot();
    assert_eq!(snap.posted_count, total as u64);
    assert_eq!(snap.delivered_count, total as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_bursts_on_one_key_all_arrive() {
    let recorder = Recorder::new();
    let scheduler = recording_scheduler::<&'static str>(&recorder);

    let mut expected = 0;
    for burst in 0..20u32 {
        for seq in 0..10 {
            scheduler.submit("bursty", vec![1], (burst, seq)).unwrap();
        }
        expected += 10;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(eventually(SETTLE, || recorder.len() == expected).await);
    let flattened: Vec<Event> = recorder.events();
    let mut sorted = flattened.clone();
    sorted.sort();
    assert_eq!(flattened, sorted, "bursts were reordered");
}

// =========================================================================
// Thread identity as key
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thread_key_orders_each_producer_thread() {
    let recorder = Recorder::new();
    let scheduler = recording_scheduler::<ThreadKey>(&recorder);

    let producers: Vec<_> = (0..3u32)
        .map(|producer| {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                for seq in 0..300 {
                    scheduler
                        .submit_from_current_thread(vec![1], (producer, seq))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(eventually(SETTLE, || recorder.len() == 900).await);
    for (producer, seqs) in sequences_by_stream(&recorder.events()) {
        assert_eq!(seqs, (0..300).collect::<Vec<_>>(), "thread {producer} out of order");
    }
}
