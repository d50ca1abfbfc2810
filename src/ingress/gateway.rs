use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatcher::{Dispatcher, Message, SubmissionId};
use crate::ingress::validation;
use crate::utils::error::SubmissionError;

/// Entry point for inbound messages.
///
/// The gateway holds no state of its own beyond a handle to the dispatcher it
/// feeds, so clones are cheap and can be handed to every connection.
#[derive(Debug, Clone)]
pub struct IngressGateway {
    dispatcher: Arc<Dispatcher>,
}

impl IngressGateway {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Validates `message` and hands it to the dispatcher.
    ///
    /// Under the `Block` policy this waits for queue space.
    pub async fn submit(&self, message: Message) -> Result<SubmissionId, SubmissionError> {
        validation::validate(&message)?;

        match self.dispatcher.enqueue(message).await {
            Ok(id) => {
                debug!(message_id = %id, channel = self.dispatcher.channel(), "Submission accepted");
                Ok(id)
            }
            Err(e) => {
                warn!(channel = self.dispatcher.channel(), error = %e, "Submission refused");
                Err(e.into())
            }
        }
    }

    /// Validates a raw JSON body against the message schema, then submits it.
    pub async fn submit_json(&self, body: &Value) -> Result<SubmissionId, SubmissionError> {
        let message = validation::parse_message(body)?;
        self.submit(message).await
    }
}
