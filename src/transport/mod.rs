//! The `transport` module is responsible for network communication with
//! submitters over WebSockets.
//!
//! It defines the JSON frames exchanged with clients and implements the
//! WebSocket server that forwards `submit` frames to the ingress gateway.

pub mod message;
pub mod websocket;
