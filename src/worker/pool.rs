//! Consumer worker pool
//!
//! Each worker loops `dequeue -> process -> settle` until its dispatcher is
//! closed and drained:
//! - before processing, the envelope is marked unacked in the store
//! - failures are retried with exponential backoff per `RetryPolicy`
//! - success clears the unacked mark (acknowledgement)
//! - exhaustion writes one dead-letter record, then clears the mark
//!
//! If the dead-letter write itself fails the unacked mark is kept, so the
//! message is redelivered on the next run instead of being dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, Envelope};
use crate::persistence::Persistence;
use crate::utils::error::ProcessingError;
use crate::worker::processor::Processor;
use crate::worker::retry::RetryPolicy;

/// Result of delivering one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged { attempts: u32 },
    DeadLettered { attempts: u32, error: ProcessingError },
}

#[derive(Debug, Default)]
struct PoolStats {
    acknowledged: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

impl PoolStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub acknowledged: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

/// What happened when a pool was shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every queued envelope was handed to a worker and settled.
    pub drained: bool,
    /// Queued envelopes saved as unacked because the timeout expired first.
    pub persisted: usize,
    /// Counters at the moment the pool stopped.
    pub stats: StatsSnapshot,
}

pub struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    persistence: Persistence,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawns `count` workers (at least one) on the current tokio runtime.
    pub fn spawn(
        count: usize,
        dispatcher: Arc<Dispatcher>,
        processor: Arc<dyn Processor>,
        persistence: Persistence,
        retry: RetryPolicy,
    ) -> Self {
        let stats = Arc::new(PoolStats::default());

        let workers = (0..count.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    dispatcher: dispatcher.clone(),
                    processor: processor.clone(),
                    persistence: persistence.clone(),
                    retry,
                    stats: stats.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        info!(
            channel = dispatcher.channel(),
            workers = workers.len(),
            max_retries = retry.max_retries,
            "Worker pool started"
        );

        Self {
            dispatcher,
            persistence,
            workers,
            stats,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Closes the dispatcher and waits up to `timeout` for the workers to
    /// drain the queue and finish their current message.
    ///
    /// On timeout the workers are aborted. In-flight envelopes keep their
    /// unacked marks and anything still queued is marked unacked, so all of
    /// it is redelivered by the next run.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownReport {
        let WorkerPool {
            dispatcher,
            persistence,
            workers,
            stats,
        } = self;

        dispatcher.close();
        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

        let (drained, persisted) = match tokio::time::timeout(timeout, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(channel = dispatcher.channel(), error = %e, "Worker terminated abnormally");
                    }
                }
                (true, 0)
            }
            Err(_) => {
                warn!(
                    channel = dispatcher.channel(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Workers did not drain in time, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }

                let mut persisted = 0;
                for envelope in dispatcher.drain() {
                    match persistence.mark_unacked(&envelope) {
                        Ok(()) => persisted += 1,
                        Err(e) => error!(
                            message_id = %envelope.id(),
                            error = %e,
                            "Failed to persist queued message during shutdown"
                        ),
                    }
                }
                (false, persisted)
            }
        };

        if let Err(e) = persistence.flush() {
            error!(error = %e, "Failed to flush store during shutdown");
        }

        let report = ShutdownReport {
            drained,
            persisted,
            stats: stats.snapshot(),
        };
        info!(
            channel = dispatcher.channel(),
            drained,
            persisted,
            acknowledged = report.stats.acknowledged,
            dead_lettered = report.stats.dead_lettered,
            "Worker pool stopped"
        );
        report
    }
}

struct Worker {
    id: usize,
    dispatcher: Arc<Dispatcher>,
    processor: Arc<dyn Processor>,
    persistence: Persistence,
    retry: RetryPolicy,
    stats: Arc<PoolStats>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, channel = self.dispatcher.channel(), "Worker started");

        while let Some(envelope) = self.dispatcher.dequeue().await {
            if let Err(e) = self.persistence.mark_unacked(&envelope) {
                error!(message_id = %envelope.id(), error = %e, "Failed to mark message unacked");
            }
            let outcome = self.deliver(&envelope).await;
            self.settle(&envelope, outcome);
        }

        debug!(worker = self.id, channel = self.dispatcher.channel(), "Worker stopped");
    }

    async fn deliver(&self, envelope: &Envelope) -> DeliveryOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.processor.process(envelope).await {
                Ok(()) => return DeliveryOutcome::Acknowledged { attempts },
                Err(error) if attempts > self.retry.max_retries => {
                    return DeliveryOutcome::DeadLettered { attempts, error };
                }
                Err(error) => {
                    let delay = self.retry.backoff(attempts);
                    warn!(
                        worker = self.id,
                        message_id = %envelope.id(),
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Processing failed, will retry"
                    );
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn settle(&self, envelope: &Envelope, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Acknowledged { attempts } => {
                self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
                debug!(worker = self.id, message_id = %envelope.id(), attempts, "Message acknowledged");
            }
            DeliveryOutcome::DeadLettered { attempts, error } => {
                if let Err(e) = self
                    .persistence
                    .record_dead_letter(envelope, attempts, &error.to_string())
                {
                    error!(
                        message_id = %envelope.id(),
                        error = %e,
                        "Failed to record dead letter, leaving message unacked"
                    );
                    return;
                }
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = self.id,
                    message_id = %envelope.id(),
                    title = envelope.title(),
                    attempts,
                    error = %error,
                    "Message moved to dead-letter record"
                );
            }
        }

        if let Err(e) = self.persistence.clear_unacked(envelope) {
            error!(message_id = %envelope.id(), error = %e, "Failed to clear unacked mark");
        }
    }
}
