//! Minimal JMAP client: session bootstrap and method-call batches.
//!
//! This is not a general JMAP implementation; it covers exactly what the
//! pipeline needs — `Email/get`, `Email/changes` with a back-reference,
//! and the event-source URL from the session document.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::JmapConfig;
use crate::error::MailError;

const CORE_CAPABILITY: &str = "urn:ietf:params:jmap:core";
const MAIL_CAPABILITY: &str = "urn:ietf:params:jmap:mail";

/// Request timeout for session and method calls. The event stream is
/// long-lived and sets no timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// JMAP session document, fetched once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResource {
    api_url: String,
    event_source_url: String,
    primary_accounts: HashMap<String, String>,
}

/// Authenticated JMAP endpoint bound to the primary mail account.
pub struct JmapClient {
    http: reqwest::Client,
    token: SecretString,
    api_url: String,
    event_source_url: String,
    account_id: String,
}

impl JmapClient {
    /// Fetch the session document and bind to the primary mail account.
    pub async fn connect(http: reqwest::Client, config: &JmapConfig) -> Result<Self, MailError> {
        let response = http
            .get(&config.session_url)
            .bearer_auth(config.token.expose_secret())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MailError::Session(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(MailError::AuthFailed {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(MailError::Session(format!("HTTP {}", status.as_u16())));
        }

        let session: SessionResource = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(format!("session: {e}")))?;

        let account_id = session
            .primary_accounts
            .get(MAIL_CAPABILITY)
            .cloned()
            .ok_or_else(|| {
                MailError::InvalidResponse("session has no primary mail account".into())
            })?;

        tracing::info!(account_id = %account_id, "JMAP session established");
        Ok(Self {
            http,
            token: config.token.clone(),
            api_url: session.api_url,
            event_source_url: session.event_source_url,
            account_id,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Authorization header value for requests made outside this client
    /// (the event-stream GET).
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Event-source URL for Email state changes: server push, no
    /// close-after, 60 s keepalive pings.
    pub fn event_stream_url(&self) -> String {
        self.event_source_url
            .replace("{types}", "Email")
            .replace("{closeafter}", "no")
            .replace("{ping}", "60")
    }

    /// Execute a batch of method calls in one request.
    ///
    /// Calls are assigned ids `c0`, `c1`, … in order, so later calls may
    /// back-reference earlier ones (`{"resultOf": "c0", …}`). Returns the
    /// response arguments in call order.
    pub async fn request(&self, calls: &[(&str, Value)]) -> Result<Vec<Value>, MailError> {
        let method_calls: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| json!([name, args, format!("c{i}")]))
            .collect();
        let body = json!({
            "using": [CORE_CAPABILITY, MAIL_CAPABILITY],
            "methodCalls": method_calls,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.token.expose_secret())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(MailError::AuthFailed {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(MailError::Request(format!("HTTP {}", status.as_u16())));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()))?;
        parse_method_responses(&value)
    }
}

/// Pull the response arguments out of a JMAP response envelope, mapping
/// method-level errors to `MailError`.
fn parse_method_responses(value: &Value) -> Result<Vec<Value>, MailError> {
    let responses = value["methodResponses"]
        .as_array()
        .ok_or_else(|| MailError::InvalidResponse("missing methodResponses".into()))?;

    let mut results = Vec::with_capacity(responses.len());
    for response in responses {
        let name = response[0]
            .as_str()
            .ok_or_else(|| MailError::InvalidResponse("unnamed method response".into()))?;
        let args = &response[1];

        if name == "error" {
            let error_type = args["type"].as_str().unwrap_or("unknown");
            if error_type == "cannotCalculateChanges" {
                return Err(MailError::CannotCalculateChanges);
            }
            return Err(MailError::Method {
                error_type: error_type.to_string(),
                description: args["description"].as_str().unwrap_or_default().to_string(),
            });
        }
        results.push(args.clone());
    }
    Ok(results)
}
