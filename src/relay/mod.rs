//! Relay wiring
//!
//! `Relay` assembles the pipeline from `Settings` with plain constructors:
//!
//! ```text
//! IngressGateway -> Dispatcher(producer) -> WorkerPool
//!                                               |
//!                        (forward enabled)      v
//!                           Dispatcher(consumer) -> WorkerPool
//! ```
//!
//! On start, envelopes left unacked by a previous run are requeued onto the
//! channel that last held them. Shutdown proceeds stage by stage in data-flow
//! order, so the forward stage is still accepting while the ingress stage
//! drains into it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::dispatcher::{AdmissionPolicy, Dispatcher, Envelope};
use crate::ingress::IngressGateway;
use crate::persistence::Persistence;
use crate::utils::error::{RelayError, StoreError};
use crate::worker::{
    ForwardProcessor, LogProcessor, Processor, RetryPolicy, ShutdownReport, StatsSnapshot,
    WorkerPool,
};

pub struct Relay {
    gateway: IngressGateway,
    stages: Vec<WorkerPool>,
    persistence: Persistence,
    shutdown_timeout: Duration,
}

impl Relay {
    /// Starts a relay whose final stage logs every message.
    pub async fn start(settings: &Settings, persistence: Persistence) -> Result<Self, RelayError> {
        Self::start_with_processor(settings, persistence, Arc::new(LogProcessor)).await
    }

    /// Starts a relay whose final stage runs `processor`.
    ///
    /// With forwarding disabled that is the ingress stage; otherwise the
    /// ingress stage logs and forwards, and `processor` consumes the forward
    /// channel.
    pub async fn start_with_processor(
        settings: &Settings,
        persistence: Persistence,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, RelayError> {
        settings.validate().map_err(RelayError::InvalidConfig)?;

        let retry = RetryPolicy::from(&settings.workers);
        let ingress = Arc::new(evicting_to_dead_letters(
            Dispatcher::new(
                settings.dispatcher.channel.clone(),
                settings.dispatcher.capacity,
                settings.dispatcher.policy,
            ),
            &persistence,
        ));

        let mut stages = Vec::new();
        if settings.forward.enabled {
            let downstream = Arc::new(evicting_to_dead_letters(
                Dispatcher::new(
                    settings.forward.channel.clone(),
                    settings.forward.capacity,
                    settings.forward.policy,
                ),
                &persistence,
            ));
            let forward = Arc::new(ForwardProcessor::new(
                Arc::new(LogProcessor),
                downstream.clone(),
            ));
            stages.push(WorkerPool::spawn(
                settings.workers.count,
                ingress.clone(),
                forward,
                persistence.clone(),
                retry,
            ));
            stages.push(WorkerPool::spawn(
                settings.forward.workers,
                downstream,
                processor,
                persistence.clone(),
                retry,
            ));
        } else {
            stages.push(WorkerPool::spawn(
                settings.workers.count,
                ingress.clone(),
                processor,
                persistence.clone(),
                retry,
            ));
        }

        let relay = Self {
            gateway: IngressGateway::new(ingress),
            stages,
            persistence,
            shutdown_timeout: Duration::from_secs(settings.workers.shutdown_timeout_secs),
        };
        relay.recover().await?;

        info!(
            channel = relay.gateway.dispatcher().channel(),
            capacity = settings.dispatcher.capacity,
            policy = %settings.dispatcher.policy,
            forward = settings.forward.enabled,
            "Relay started"
        );
        Ok(relay)
    }

    /// Handle for submitting messages.
    pub fn gateway(&self) -> IngressGateway {
        self.gateway.clone()
    }

    /// Per-channel worker statistics, in data-flow order.
    pub fn stats(&self) -> Vec<(String, StatsSnapshot)> {
        self.stages
            .iter()
            .map(|pool| (pool.dispatcher().channel().to_string(), pool.stats()))
            .collect()
    }

    /// Stops admission and drains every stage in data-flow order.
    ///
    /// `shutdown_timeout` bounds the whole shutdown: later stages get
    /// whatever time the earlier ones left.
    pub async fn shutdown(self) -> Vec<(String, ShutdownReport)> {
        let deadline = Instant::now() + self.shutdown_timeout;
        let mut reports = Vec::with_capacity(self.stages.len());
        for pool in self.stages {
            let channel = pool.dispatcher().channel().to_string();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let report = pool.shutdown(remaining).await;
            reports.push((channel, report));
        }
        info!("Relay stopped");
        reports
    }

    async fn recover(&self) -> Result<(), RelayError> {
        let unacked = self.persistence.unacked()?;
        if unacked.is_empty() {
            return Ok(());
        }
        info!(count = unacked.len(), "Redelivering messages left unacked by a previous run");

        for envelope in unacked {
            let target = self
                .stages
                .iter()
                .map(|pool| pool.dispatcher())
                .find(|d| d.channel() == envelope.channel());

            let (target, envelope) = match target {
                Some(dispatcher) => (dispatcher.clone(), envelope),
                None => {
                    warn!(
                        message_id = %envelope.id(),
                        channel = envelope.channel(),
                        "Unacked message belongs to an unknown channel, redelivering on ingress"
                    );
                    let ingress = self.gateway.dispatcher().clone();
                    let moved = move_unacked(&self.persistence, envelope, ingress.channel())?;
                    (ingress, moved)
                }
            };

            let id = envelope.id();
            if let Err(e) = target.requeue(envelope).await {
                error!(message_id = %id, error = %e, "Failed to requeue recovered message");
            }
        }
        Ok(())
    }
}

/// Re-keys an unacked envelope under `channel`. The new mark is written
/// before the old one is removed, so the store always holds a copy.
fn move_unacked(
    persistence: &Persistence,
    envelope: Envelope,
    channel: &str,
) -> Result<Envelope, StoreError> {
    let moved = envelope.clone().into_redelivery(channel);
    persistence.mark_unacked(&moved)?;
    persistence.clear_unacked(&envelope)?;
    Ok(moved)
}

/// Makes every eviction durable: displaced messages land in the dead-letter
/// record instead of vanishing.
fn evicting_to_dead_letters(dispatcher: Dispatcher, persistence: &Persistence) -> Dispatcher {
    if dispatcher.policy() != AdmissionPolicy::DropOldest {
        return dispatcher;
    }

    let persistence = persistence.clone();
    dispatcher.with_eviction_handler(move |envelope| {
        if let Err(e) = persistence.record_dead_letter(envelope, 0, "evicted: queue full") {
            error!(message_id = %envelope.id(), error = %e, "Failed to record evicted message");
        }
    })
}
