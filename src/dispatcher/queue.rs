//! Dispatcher engine
//!
//! This module contains the bounded in-memory queue that sits between the
//! ingress gateway and the worker pool. It is responsible for:
//! - admitting messages under the configured `AdmissionPolicy`
//! - stamping identity and admission time on every admitted message
//! - handing envelopes to consumers in FIFO order, each exactly once
//! - refusing new work once closed while still draining what is queued
//!
//! Concurrency and usage notes:
//! - The dispatcher is shared behind an `Arc`. Every operation takes the
//!   internal lock once and never holds it across an `.await`.
//! - Producers waiting for space and consumers waiting for work park on two
//!   `Notify` handles. A waiter is registered before the queue state is
//!   inspected, so a push or pop that happens in between is never missed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::dispatcher::message::{Envelope, Message, MessageId};
use crate::dispatcher::policy::AdmissionPolicy;
use crate::utils::error::EnqueueError;

/// Callback invoked with every envelope evicted under `DropOldest`.
pub type EvictionHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Envelope>,
    closed: bool,
}

enum Pending {
    New(Message),
    Recovered(Envelope),
}

impl Pending {
    fn into_envelope(self, channel: &str) -> Envelope {
        match self {
            Pending::New(message) => Envelope::admit(channel, message),
            Pending::Recovered(envelope) => envelope.into_redelivery(channel),
        }
    }
}

pub struct Dispatcher {
    channel: String,
    capacity: usize,
    policy: AdmissionPolicy,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
    on_evict: Option<EvictionHandler>,
}

impl Dispatcher {
    /// Creates an open dispatcher. A capacity of zero is treated as one.
    pub fn new(channel: impl Into<String>, capacity: usize, policy: AdmissionPolicy) -> Self {
        Self {
            channel: channel.into(),
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(QueueState::default()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            on_evict: None,
        }
    }

    pub fn with_eviction_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(handler));
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Admits a message according to the dispatcher's policy and returns the
    /// id it was assigned.
    ///
    /// Only `Block` can suspend. A closed dispatcher fails with
    /// `EnqueueError::Closed` without waiting.
    pub async fn enqueue(&self, message: Message) -> Result<MessageId, EnqueueError> {
        match self.policy {
            AdmissionPolicy::Block => self.admit_waiting(Pending::New(message)).await,
            AdmissionPolicy::Reject => self.admit_or_reject(message),
            AdmissionPolicy::DropOldest => self.admit_evicting(message),
        }
    }

    /// Re-admits an envelope recovered from an earlier run. The id and the
    /// original admission time are kept and the envelope is flagged as a
    /// redelivery. Waits for space whatever the policy, so recovered work is
    /// never rejected or evicted on the way in.
    pub async fn requeue(&self, envelope: Envelope) -> Result<MessageId, EnqueueError> {
        self.admit_waiting(Pending::Recovered(envelope)).await
    }

    /// Removes the head of the queue, suspending while the queue is empty.
    ///
    /// Returns `None` once the dispatcher is closed and every queued envelope
    /// has been handed out.
    pub async fn dequeue(&self) -> Option<Envelope> {
        loop {
            let available = self.not_empty.notified();
            tokio::pin!(available);
            available.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(envelope) = state.entries.pop_front() {
                    self.not_full.notify_one();
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
            }

            available.await;
        }
    }

    /// Non-suspending variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<Envelope> {
        let envelope = self.lock().entries.pop_front();
        if envelope.is_some() {
            self.not_full.notify_one();
        }
        envelope
    }

    /// Stops admission. Waiting producers fail with `Closed`; consumers keep
    /// receiving queued envelopes until the queue is empty.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        debug!(channel = %self.channel, "Dispatcher closed");
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Removes and returns everything still queued.
    pub fn drain(&self) -> Vec<Envelope> {
        let drained: Vec<Envelope> = self.lock().entries.drain(..).collect();
        if !drained.is_empty() {
            self.not_full.notify_waiters();
        }
        drained
    }

    async fn admit_waiting(&self, pending: Pending) -> Result<MessageId, EnqueueError> {
        loop {
            let space = self.not_full.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(EnqueueError::Closed);
                }
                if state.entries.len() < self.capacity {
                    return Ok(self.push(&mut state, pending));
                }
            }

            space.await;
        }
    }

    fn admit_or_reject(&self, message: Message) -> Result<MessageId, EnqueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(EnqueueError::Closed);
        }
        if state.entries.len() >= self.capacity {
            debug!(channel = %self.channel, capacity = self.capacity, "Queue full, rejecting message");
            return Err(EnqueueError::QueueFull {
                capacity: self.capacity,
            });
        }
        Ok(self.push(&mut state, Pending::New(message)))
    }

    fn admit_evicting(&self, message: Message) -> Result<MessageId, EnqueueError> {
        let (id, evicted) = {
            let mut state = self.lock();
            if state.closed {
                return Err(EnqueueError::Closed);
            }
            let evicted = if state.entries.len() >= self.capacity {
                state.entries.pop_front()
            } else {
                None
            };
            (self.push(&mut state, Pending::New(message)), evicted)
        };

        if let Some(envelope) = evicted {
            warn!(
                channel = %self.channel,
                message_id = %envelope.id(),
                title = envelope.title(),
                "Queue full, evicted oldest message"
            );
            if let Some(handler) = &self.on_evict {
                handler(&envelope);
            }
        }

        Ok(id)
    }

    fn push(&self, state: &mut QueueState, pending: Pending) -> MessageId {
        let envelope = pending.into_envelope(&self.channel);
        let id = envelope.id();
        state.entries.push_back(envelope);
        self.not_empty.notify_one();
        debug!(channel = %self.channel, message_id = %id, depth = state.entries.len(), "Message admitted");
        id
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
