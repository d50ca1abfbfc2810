//! The `client` module provides a small async client for submitting messages
//! to a running relay over WebSockets.

pub mod relay_client;
pub use relay_client::RelayClient;
