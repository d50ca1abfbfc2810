//! The `ingress` module is the boundary where outside requests become
//! messages. It validates payloads and submits them to a dispatcher,
//! translating queue errors into submission errors with status codes.

pub mod gateway;
pub mod validation;

pub use gateway::IngressGateway;
