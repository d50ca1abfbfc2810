use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::dispatcher::{Dispatcher, Envelope};
use crate::utils::error::ProcessingError;

/// Work performed on every dequeued message.
///
/// An `Err` is retried by the pool according to its `RetryPolicy`; the same
/// envelope may therefore be processed more than once.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError>;
}

/// Logs a structured record of each message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

#[async_trait]
impl Processor for LogProcessor {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        info!(
            message_id = %envelope.id(),
            channel = envelope.channel(),
            title = envelope.title(),
            metadata = ?envelope.metadata(),
            enqueued_at = %envelope.enqueued_at(),
            redelivered = envelope.is_redelivery(),
            "A message was received"
        );
        Ok(())
    }
}

/// Runs an inner processor, then republishes the message onto a downstream
/// dispatcher.
///
/// A full or closed downstream fails the attempt, so forwarding is retried
/// like any other processing error.
pub struct ForwardProcessor {
    inner: Arc<dyn Processor>,
    downstream: Arc<Dispatcher>,
}

impl ForwardProcessor {
    pub fn new(inner: Arc<dyn Processor>, downstream: Arc<Dispatcher>) -> Self {
        Self { inner, downstream }
    }
}

#[async_trait]
impl Processor for ForwardProcessor {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        self.inner.process(envelope).await?;

        let forwarded = self.downstream.enqueue(envelope.message().clone()).await?;
        debug!(
            message_id = %envelope.id(),
            forwarded_id = %forwarded,
            from = envelope.channel(),
            to = self.downstream.channel(),
            "Message forwarded"
        );
        Ok(())
    }
}
