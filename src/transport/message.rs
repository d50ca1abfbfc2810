use serde::{Deserialize, Serialize};

/// Frames sent by clients.
///
/// `message` is kept as raw JSON so the ingress gateway can validate its
/// schema and answer with a precise error.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "submit")]
    Submit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: serde_json::Value,
    },
}

/// Frames sent back by the server, one per `submit`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "accepted")]
    Accepted {
        request_id: Option<String>,
        submission_id: String,
    },
    #[serde(rename = "rejected")]
    Rejected {
        request_id: Option<String>,
        status: u16,
        error: String,
    },
}
