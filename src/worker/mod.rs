//! The `worker` module consumes messages from a dispatcher.
//!
//! It provides the `Processor` seam, the built-in log and forward
//! processors, the retry policy, and the pool that ties them together.

pub mod pool;
pub mod processor;
pub mod retry;

pub use pool::{DeliveryOutcome, ShutdownReport, StatsSnapshot, WorkerPool};
pub use processor::{ForwardProcessor, LogProcessor, Processor};
pub use retry::RetryPolicy;

#[cfg(test)]
mod tests;
