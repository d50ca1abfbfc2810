use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ForwardProcessor, LogProcessor, Processor, RetryPolicy, WorkerPool};
use crate::dispatcher::{AdmissionPolicy, Dispatcher, Envelope, Message};
use crate::persistence::Persistence;
use crate::utils::error::{EnqueueError, ProcessingError};

/// Fails the first `failures` calls, then succeeds.
#[derive(Default)]
struct Flaky {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Processor for Flaky {
    async fn process(&self, _envelope: &Envelope) -> Result<(), ProcessingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(ProcessingError::new(format!("failure #{call}")))
        } else {
            Ok(())
        }
    }
}

/// Records every envelope it sees, optionally taking its time.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Envelope>>,
    delay: Duration,
}

#[async_trait]
impl Processor for Recorder {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
}

fn dispatcher(capacity: usize) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new("producer", capacity, AdmissionPolicy::Block))
}

#[test]
fn test_backoff_doubles_and_caps() {
    let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
    assert_eq!(policy.max_attempts(), 6);
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
    assert_eq!(policy.backoff(4), Duration::from_millis(500));
    assert_eq!(policy.backoff(60), Duration::from_millis(500));
}

#[tokio::test]
async fn test_retries_until_success_without_dead_letter() {
    let dispatcher = dispatcher(4);
    let store = Persistence::temporary().unwrap();
    let processor = Arc::new(Flaky {
        failures: 2,
        ..Default::default()
    });

    dispatcher.enqueue(Message::new("eventually")).await.unwrap();
    let pool = WorkerPool::spawn(1, dispatcher, processor.clone(), store.clone(), fast_retry(3));

    let report = pool.shutdown(Duration::from_secs(5)).await;
    assert!(report.drained);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.stats.acknowledged, 1);
    assert_eq!(report.stats.retried, 2);
    assert_eq!(report.stats.dead_lettered, 0);
    assert_eq!(store.dead_letter_count(), 0);
    assert_eq!(store.unacked_count(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_exactly_once() {
    let dispatcher = dispatcher(4);
    let store = Persistence::temporary().unwrap();
    let processor = Arc::new(Flaky {
        failures: u32::MAX,
        ..Default::default()
    });

    let id = dispatcher.enqueue(Message::new("doomed")).await.unwrap();
    let pool = WorkerPool::spawn(2, dispatcher, processor.clone(), store.clone(), fast_retry(2));

    let stats = pool.shutdown(Duration::from_secs(5)).await.stats;
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.acknowledged, 0);

    assert_eq!(store.dead_letter_count(), 1);
    let dead = store.find_dead_letter(id).unwrap().unwrap();
    assert_eq!(dead.attempts, 3);
    assert_eq!(dead.last_error, "failure #3");
    assert_eq!(dead.envelope.title(), "doomed");
    assert_eq!(store.unacked_count(), 0);
}

#[tokio::test]
async fn test_shutdown_delivers_queued_messages_then_refuses_new_ones() {
    let dispatcher = dispatcher(10);
    let store = Persistence::temporary().unwrap();
    let processor = Arc::new(Recorder {
        delay: Duration::from_millis(10),
        ..Default::default()
    });

    for title in ["one", "two", "three"] {
        dispatcher.enqueue(Message::new(title)).await.unwrap();
    }

    let pool = WorkerPool::spawn(1, dispatcher.clone(), processor.clone(), store.clone(), fast_retry(0));
    let report = pool.shutdown(Duration::from_secs(5)).await;

    assert!(report.drained);
    assert_eq!(report.persisted, 0);
    let titles: Vec<_> = processor
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.title().to_string())
        .collect();
    assert_eq!(titles, vec!["one", "two", "three"]);

    assert_eq!(
        dispatcher.enqueue(Message::new("four")).await,
        Err(EnqueueError::Closed)
    );
}

#[tokio::test]
async fn test_shutdown_timeout_keeps_work_for_next_run() {
    let dispatcher = dispatcher(10);
    let store = Persistence::temporary().unwrap();
    let processor = Arc::new(Recorder {
        delay: Duration::from_secs(30),
        ..Default::default()
    });

    for title in ["slow", "queued-1", "queued-2"] {
        dispatcher.enqueue(Message::new(title)).await.unwrap();
    }
    let pool = WorkerPool::spawn(1, dispatcher.clone(), processor, store.clone(), fast_retry(0));

    // let the single worker pick up "slow"
    tokio::time::sleep(Duration::from_millis(50)).await;
    let report = pool.shutdown(Duration::from_millis(50)).await;

    assert!(!report.drained);
    assert_eq!(report.persisted, 2);
    assert!(dispatcher.is_empty());

    let mut titles: Vec<_> = store
        .unacked()
        .unwrap()
        .iter()
        .map(|e| e.title().to_string())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["queued-1", "queued-2", "slow"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_message_processed_exactly_once_across_workers() {
    let dispatcher = dispatcher(8);
    let store = Persistence::temporary().unwrap();
    let processor = Arc::new(Recorder::default());
    let pool = WorkerPool::spawn(4, dispatcher.clone(), processor.clone(), store, fast_retry(0));
    assert_eq!(pool.size(), 4);

    let mut ids = Vec::new();
    for i in 0..100 {
        ids.push(dispatcher.enqueue(Message::new(format!("m{i}"))).await.unwrap());
    }

    let report = pool.shutdown(Duration::from_secs(5)).await;
    assert!(report.drained);
    assert_eq!(report.stats.acknowledged, 100);

    let mut seen: Vec<_> = processor.seen.lock().unwrap().iter().map(|e| e.id()).collect();
    seen.sort();
    ids.sort();
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn test_forward_processor_republishes_downstream() {
    let downstream = Arc::new(Dispatcher::new("consumer", 2, AdmissionPolicy::Reject));
    let forward = ForwardProcessor::new(Arc::new(LogProcessor), downstream.clone());

    let upstream = Dispatcher::new("producer", 2, AdmissionPolicy::Reject);
    upstream
        .enqueue(Message::new("relay me").with_metadata("hop", "1"))
        .await
        .unwrap();
    let envelope = upstream.try_dequeue().unwrap();

    forward.process(&envelope).await.unwrap();

    let copy = downstream.try_dequeue().unwrap();
    assert_eq!(copy.channel(), "consumer");
    assert_eq!(copy.message(), envelope.message());
}

#[tokio::test]
async fn test_forward_processor_fails_when_downstream_unavailable() {
    let downstream = Arc::new(Dispatcher::new("consumer", 1, AdmissionPolicy::Reject));
    let forward = ForwardProcessor::new(Arc::new(LogProcessor), downstream.clone());

    let upstream = Dispatcher::new("producer", 2, AdmissionPolicy::Reject);
    upstream.enqueue(Message::new("a")).await.unwrap();
    upstream.enqueue(Message::new("b")).await.unwrap();

    forward.process(&upstream.try_dequeue().unwrap()).await.unwrap();
    let err = forward
        .process(&upstream.try_dequeue().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("queue is full"));

    downstream.close();
    upstream.enqueue(Message::new("c")).await.unwrap();
    let err = forward
        .process(&upstream.try_dequeue().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"));
}
