//! Push gateway trait: one outbound notification per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A push notification addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Destination device token.
    pub to: String,
    pub title: String,
    pub body: String,
    /// Structured payload delivered alongside the text.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Result of a single dispatch attempt. None of these are fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Accepted by the gateway; carries the gateway's ticket id.
    Delivered { ticket: String },
    /// Refused for this recipient (bad token, device unregistered).
    Rejected(String),
    /// Transport or gateway failure, including timeouts.
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Gateway name for logs ("expo", "log", ...).
    fn name(&self) -> &str;

    /// Local syntactic check of a destination token. No network call.
    fn validate_token(&self, token: &str) -> bool {
        !token.trim().is_empty()
    }

    /// Make exactly one delivery attempt. No retries.
    async fn send(&self, message: &PushMessage) -> DispatchOutcome;
}
