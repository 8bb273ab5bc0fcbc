//! Push dispatch: delivers harvest reminders to the Expo push service.
//! One HTTP request per reminder, no retries; the sweep decides what to do
//! with a failure on the next tick.

use std::time::Duration;

use async_trait::async_trait;
use gourdwatch_core::config::PushConfig;
use gourdwatch_core::traits::{DispatchOutcome, PushGateway, PushMessage};

/// Expo push API client.
pub struct ExpoPushGateway {
    endpoint: String,
    access_token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ExpoPushGateway {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            access_token: Some(config.access_token.clone()).filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PushGateway for ExpoPushGateway {
    fn name(&self) -> &str {
        "expo"
    }

    fn validate_token(&self, token: &str) -> bool {
        is_expo_push_token(token)
    }

    async fn send(&self, message: &PushMessage) -> DispatchOutcome {
        if !is_expo_push_token(&message.to) {
            return DispatchOutcome::Rejected(format!("Invalid Expo push token: {}", message.to));
        }

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "to": message.to,
                "title": message.title,
                "body": message.body,
                "data": message.data,
                "sound": "default",
            }))
            .timeout(self.timeout);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return DispatchOutcome::Failed(format!("Expo send failed: {e}")),
        };

        let status = resp.status();
        let body: serde_json::Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                return DispatchOutcome::Failed(format!(
                    "Expo response unreadable ({status}): {e}"
                ));
            }
        };
        let outcome = interpret_response(status.as_u16(), &body);
        if outcome.is_delivered() {
            tracing::debug!("✅ Expo accepted reminder: {}", message.title);
        }
        outcome
    }
}

/// Map an Expo push response to a dispatch outcome.
///
/// A single message yields `{"data": {"status": "ok", "id": ...}}`; the
/// service may also wrap it in a one-element array. Request-level problems
/// come back as `{"errors": [...]}`.
pub fn interpret_response(status: u16, body: &serde_json::Value) -> DispatchOutcome {
    if !(200..300).contains(&status) {
        let detail = body["errors"][0]["message"]
            .as_str()
            .unwrap_or("no detail");
        return DispatchOutcome::Failed(format!("Expo API error {status}: {detail}"));
    }

    let ticket = match &body["data"] {
        serde_json::Value::Array(items) => items.first().cloned().unwrap_or_default(),
        other => other.clone(),
    };

    match ticket["status"].as_str() {
        Some("ok") => DispatchOutcome::Delivered {
            ticket: ticket["id"].as_str().unwrap_or_default().to_string(),
        },
        Some("error") => {
            let message = ticket["message"].as_str().unwrap_or("unknown error");
            match ticket["details"]["error"].as_str() {
                Some("DeviceNotRegistered") => {
                    DispatchOutcome::Rejected(format!("DeviceNotRegistered: {message}"))
                }
                Some(code) => DispatchOutcome::Failed(format!("{code}: {message}")),
                None => DispatchOutcome::Failed(message.to_string()),
            }
        }
        _ => DispatchOutcome::Failed(format!("Unexpected Expo response: {body}")),
    }
}

/// Local syntactic check of an Expo push token: `ExponentPushToken[...]`,
/// `ExpoPushToken[...]`, or a bare UUID-shaped device id.
pub fn is_expo_push_token(token: &str) -> bool {
    let bracketed = ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .filter_map(|prefix| token.strip_prefix(prefix))
        .any(|rest| {
            rest.strip_suffix(']')
                .is_some_and(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
        });
    bracketed || is_uuid_shaped(token)
}

fn is_uuid_shaped(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Gateway that only logs. Used when no push endpoint is configured.
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &PushMessage) -> DispatchOutcome {
        tracing::info!("📢 [push → {}] {}: {}", message.to, message.title, message.body);
        DispatchOutcome::Delivered {
            ticket: format!("log-{}", chrono::Utc::now().timestamp_millis()),
        }
    }
}
