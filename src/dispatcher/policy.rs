use std::fmt;

use serde::{Deserialize, Serialize};

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Suspend the producer until a consumer frees a slot.
    #[default]
    Block,
    /// Fail immediately with `EnqueueError::QueueFull`.
    Reject,
    /// Evict the oldest queued message to make room. Every eviction is
    /// reported through the dispatcher's eviction handler.
    DropOldest,
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdmissionPolicy::Block => "block",
            AdmissionPolicy::Reject => "reject",
            AdmissionPolicy::DropOldest => "drop_oldest",
        };
        f.write_str(name)
    }
}
