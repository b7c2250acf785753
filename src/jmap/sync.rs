//! Incremental mail synchronization: fetch only messages created since a
//! server-issued state token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::error::MailError;
use crate::jmap::client::JmapClient;

/// Email properties requested from the server.
const EMAIL_PROPERTIES: [&str; 6] = [
    "id",
    "subject",
    "from",
    "textBody",
    "bodyValues",
    "receivedAt",
];

/// A fetched message. Transient: lives for one pipeline pass only.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub id: String,
    /// First sender address (display name if the address is missing).
    pub from: String,
    pub subject: String,
    /// All plain-text body parts flattened into one string.
    pub text_body: String,
    pub received_at: Option<DateTime<Utc>>,
}

/// Result of one incremental fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub emails: Vec<EmailMessage>,
    /// State token covering everything up to this fetch.
    pub new_state: String,
}

/// Mail access port for the pipeline.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Current mailbox state without reading any mail (zero-result get).
    /// Used to seed the cursor on first run and after a failed diff.
    async fn current_state(&self) -> Result<String, MailError>;

    /// Messages created since `state`, plus the new state token.
    async fn fetch_since(&self, state: &str) -> Result<FetchResult, MailError>;
}

/// `MailSource` over a JMAP endpoint.
pub struct JmapMailSource {
    client: Arc<JmapClient>,
}

impl JmapMailSource {
    pub fn new(client: Arc<JmapClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MailSource for JmapMailSource {
    async fn current_state(&self) -> Result<String, MailError> {
        let responses = self
            .client
            .request(&[(
                "Email/get",
                json!({"accountId": self.client.account_id(), "ids": []}),
            )])
            .await?;
        responses[0]["state"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| MailError::InvalidResponse("Email/get returned no state".into()))
    }

    async fn fetch_since(&self, state: &str) -> Result<FetchResult, MailError> {
        let account_id = self.client.account_id();
        // One round trip: the get call back-references the changes call's
        // created ids.
        let responses = self
            .client
            .request(&[
                (
                    "Email/changes",
                    json!({"accountId": account_id, "sinceState": state}),
                ),
                (
                    "Email/get",
                    json!({
                        "accountId": account_id,
                        "#ids": {"resultOf": "c0", "name": "Email/changes", "path": "/created"},
                        "properties": EMAIL_PROPERTIES,
                        "fetchTextBodyValues": true,
                    }),
                ),
            ])
            .await?;

        let new_state = responses[0]["newState"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| MailError::InvalidResponse("Email/changes has no newState".into()))?;

        let emails = match responses[1]["list"].as_array() {
            Some(list) => list.iter().map(parse_email).collect(),
            None => {
                debug!("No new emails in this state change");
                Vec::new()
            }
        };

        debug!(count = emails.len(), new_state = %new_state, "Fetched new emails");
        Ok(FetchResult { emails, new_state })
    }
}

/// Map a JMAP Email object to an `EmailMessage`, defaulting every absent
/// field rather than failing the batch.
fn parse_email(value: &Value) -> EmailMessage {
    EmailMessage {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        from: first_from_address(&value["from"]),
        subject: value["subject"].as_str().unwrap_or_default().to_string(),
        text_body: flatten_text_body(value),
        received_at: value["receivedAt"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn first_from_address(from: &Value) -> String {
    let Some(first) = from.as_array().and_then(|a| a.first()) else {
        return String::new();
    };
    first["email"]
        .as_str()
        .or_else(|| first["name"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Join all plain-text body parts in part order. Parts without a body
/// value contribute an empty string.
fn flatten_text_body(email: &Value) -> String {
    let Some(parts) = email["textBody"].as_array() else {
        return String::new();
    };
    let body_values = &email["bodyValues"];
    parts
        .iter()
        .map(|part| {
            part["partId"]
                .as_str()
                .and_then(|id| body_values[id]["value"].as_str())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
