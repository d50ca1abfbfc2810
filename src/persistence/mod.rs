//! The `persistence` module provides durable storage for the relay.
//!
//! It keeps the dead-letter record, where messages land after exhausting
//! their retries, and the bookkeeping of envelopes that workers have taken
//! but not yet settled, so an interrupted run can redeliver them.
//!
//! It uses `sled` as an embedded key-value store.

pub mod sled_store;

pub use sled_store::{DeadLetter, Persistence};

#[cfg(test)]
mod tests;
