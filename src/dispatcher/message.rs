//! Message definitions for the dispatcher
//!
//! `Message` is the inbound data object: a required `title` plus optional
//! string metadata. Once a dispatcher admits it, the message is wrapped in an
//! `Envelope` which carries the identity and admission timestamp. Envelope
//! fields are private, so an admitted message cannot be changed by the
//! workers that read it.
//!
//! Notes on fields:
//! - `id`: UUID assigned at admission, returned to the submitter
//! - `channel`: name of the dispatcher that admitted the message
//! - `enqueued_at`: UTC time of admission, stamped by the dispatcher
//! - `redelivered`: set when the envelope was recovered from an earlier run

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

/// Identifier handed back to a submitter; the same value as the admitted
/// message's id.
pub type SubmissionId = MessageId;

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub title: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: MessageId,
    channel: String,
    message: Message,
    enqueued_at: DateTime<Utc>,
    #[serde(default)]
    redelivered: bool,
}

impl Envelope {
    pub(crate) fn admit(channel: &str, message: Message) -> Self {
        Self {
            id: MessageId::new(),
            channel: channel.to_string(),
            message,
            enqueued_at: Utc::now(),
            redelivered: false,
        }
    }

    pub(crate) fn into_redelivery(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self.redelivered = true;
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn title(&self) -> &str {
        &self.message.title
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.message.metadata
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// True when this envelope was recovered from a previous run and is
    /// being delivered again.
    pub fn is_redelivery(&self) -> bool {
        self.redelivered
    }
}
