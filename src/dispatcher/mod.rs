//! The `dispatcher` module holds the bounded FIFO queue that relays messages
//! from the ingress gateway to the worker pool, together with the message
//! types it carries.
//!
//! Public types:
//! - `Dispatcher`: the queue itself, with backpressure and shutdown
//! - `AdmissionPolicy`: block, reject or drop-oldest when full
//! - `Message` / `Envelope`: inbound data object and its admitted form

pub mod message;
pub mod policy;
pub mod queue;

pub use message::{Envelope, Message, MessageId, SubmissionId};
pub use policy::AdmissionPolicy;
pub use queue::{Dispatcher, EvictionHandler};
