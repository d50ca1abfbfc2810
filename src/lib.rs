//! # msgrelay
//!
//! `msgrelay` is an asynchronous message relay built on Tokio. Messages are
//! submitted over WebSockets, validated, queued on a bounded channel and
//! processed by a pool of workers with retries, dead-lettering and graceful
//! shutdown.
//!
//! ## Core Modules
//!
//! - `dispatcher`: bounded FIFO channel with a configurable admission policy.
//! - `ingress`: validates submissions and hands them to the dispatcher.
//! - `worker`: worker pool, processors and the retry policy.
//! - `persistence`: sled-backed dead letters and unacknowledged messages.
//! - `relay`: wires the stages together from the configuration.
//! - `transport`: the WebSocket server that accepts submissions.
//! - `client`: a WebSocket client for submitting messages.
//! - `config`: layered configuration from file and environment.
//! - `utils`: error types and logging setup.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod ingress;
pub mod persistence;
pub mod relay;
pub mod transport;
pub mod utils;
pub mod worker;
