//! Push listener — long-lived event stream over the JMAP event source.
//!
//! The server emits `state` events whenever a data type changes for an
//! account; the listener invokes the change callback once per account
//! whose changes include Email. Transient failures reconnect after a
//! short delay; only an authentication error tears the listener down.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::jmap::client::JmapClient;

/// Delay before reconnecting after a dropped or failed stream.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Consecutive-error thresholds for log escalation.
const WARN_AFTER: u32 = 3;
const ERROR_AFTER: u32 = 10;

/// Handle to a running listener. `close()` is idempotent.
pub struct ListenerHandle {
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.task.abort();
            info!("Event listener closed");
        }
    }
}

/// Spawn the push listener. `on_change` is invoked with the account id
/// for every Email state change; it must not block (spawn work instead).
pub fn spawn_listener<F>(client: Arc<JmapClient>, on_change: F) -> ListenerHandle
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let closed = Arc::new(AtomicBool::new(false));
    let closed_flag = Arc::clone(&closed);

    let url = client.event_stream_url();
    let http = client.http().clone();
    let auth = client.auth_header();

    let task = tokio::spawn(async move {
        let mut consecutive_errors: u32 = 0;

        loop {
            if closed_flag.load(Ordering::SeqCst) {
                return;
            }

            match open_stream(&http, &url, &auth).await {
                Ok(response) => {
                    consecutive_errors = 0;
                    info!("Event stream connected");

                    let mut parser = SseParser::new();
                    let mut stream = response.bytes_stream();
                    let mut stream_error: Option<String> = None;

                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(bytes) => {
                                for event in parser.push(&bytes) {
                                    if event.name != "state" {
                                        continue;
                                    }
                                    match changed_accounts(&event.data) {
                                        Ok(accounts) => {
                                            consecutive_errors = 0;
                                            for account in accounts {
                                                debug!(account_id = %account, "Email state change");
                                                on_change(&account);
                                            }
                                        }
                                        Err(e) => {
                                            warn!(error = %e, "Discarding malformed state event");
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                stream_error = Some(e.to_string());
                                break;
                            }
                        }
                    }

                    consecutive_errors += 1;
                    log_listener_error(
                        consecutive_errors,
                        &stream_error.unwrap_or_else(|| "stream ended".into()),
                    );
                }
                Err(OpenError::Auth(status)) => {
                    error!(status, "Event stream auth error, closing connection");
                    return;
                }
                Err(OpenError::Transient(message)) => {
                    consecutive_errors += 1;
                    log_listener_error(consecutive_errors, &message);
                }
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });

    ListenerHandle { closed, task }
}

enum OpenError {
    Auth(u16),
    Transient(String),
}

async fn open_stream(
    http: &reqwest::Client,
    url: &str,
    auth: &str,
) -> Result<reqwest::Response, OpenError> {
    // No request timeout: the stream stays open until the server or the
    // handle closes it; the server's ping interval keeps it alive.
    let response = http
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::AUTHORIZATION, auth)
        .send()
        .await
        .map_err(|e| OpenError::Transient(e.to_string()))?;

    let status = response.status().as_u16();
    match status {
        401 | 403 => Err(OpenError::Auth(status)),
        _ if !response.status().is_success() => {
            Err(OpenError::Transient(format!("HTTP {status}")))
        }
        _ => Ok(response),
    }
}

fn log_listener_error(consecutive: u32, message: &str) {
    if consecutive >= ERROR_AFTER {
        error!(consecutive, "Event stream error: {message}");
    } else if consecutive >= WARN_AFTER {
        warn!(consecutive, "Event stream error: {message}");
    } else {
        debug!(consecutive, "Event stream error: {message}");
    }
}

/// A state-change push payload: account id -> (type name -> new state).
#[derive(Debug, Deserialize)]
struct StateChange {
    changed: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Accounts whose changes include the Email type.
fn changed_accounts(data: &str) -> Result<Vec<String>, serde_json::Error> {
    let change: StateChange = serde_json::from_str(data)?;
    Ok(change
        .changed
        .into_iter()
        .filter(|(_, types)| types.contains_key("Email"))
        .map(|(account, _)| account)
        .collect())
}

// ── SSE framing ─────────────────────────────────────────────────────

/// One server-sent event.
#[derive(Debug, Clone, PartialEq)]
struct SseEvent {
    name: String,
    data: String,
}

/// Incremental `text/event-stream` parser. Handles events split across
/// chunk boundaries; comment lines (leading `:`) are keepalive pings.
struct SseParser {
    buf: Vec<u8>,
    event_name: String,
    data_lines: Vec<String>,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            event_name: String::new(),
            data_lines: Vec::new(),
        }
    }

    /// Feed a chunk; returns every event completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(rest) = line.strip_prefix(':') {
                debug!(comment = rest.trim(), "Event stream keepalive");
            } else if let Some(value) = field_value(line, "event") {
                self.event_name = value.to_string();
            } else if let Some(value) = field_value(line, "data") {
                self.data_lines.push(value.to_string());
            }
            // Other fields (id, retry) are irrelevant here.
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() && self.event_name.is_empty() {
            return None;
        }
        let event = SseEvent {
            name: if self.event_name.is_empty() {
                "message".to_string()
            } else {
                std::mem::take(&mut self.event_name)
            },
            data: self.data_lines.join("\n"),
        };
        self.event_name.clear();
        self.data_lines.clear();
        Some(event)
    }
}

/// `field: value` with the optional single leading space stripped.
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: state\ndata: {\"changed\":{}}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "state");
        assert_eq!(events[0].data, "{\"changed\":{}}");
    }

    #[test]
    fn handles_events_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: sta").is_empty());
        assert!(parser.push(b"te\ndata: {\"changed\"").is_empty());
        let events = parser.push(b":{}}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "state");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
        assert_eq!(events[0].name, "message");
    }

    #[test]
    fn ignores_comment_lines() {
        let mut parser = SseParser::new();
        assert!(parser.push(b": ping\n\n").is_empty());
    }

    #[test]
    fn strips_carriage_returns() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: state\r\ndata: {}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn changed_accounts_filters_on_email_type() {
        let data = r#"{"changed": {
            "acc1": {"Email": "s12", "Mailbox": "s4"},
            "acc2": {"Mailbox": "s9"}
        }}"#;
        assert_eq!(changed_accounts(data).unwrap(), vec!["acc1".to_string()]);
    }

    #[test]
    fn changed_accounts_rejects_malformed_payload() {
        assert!(changed_accounts("not json").is_err());
        assert!(changed_accounts(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn changed_accounts_multiple_accounts() {
        let data = r#"{"changed": {
            "a": {"Email": "s1"},
            "b": {"Email": "s2"}
        }}"#;
        let accounts = changed_accounts(data).unwrap();
        assert_eq!(accounts, vec!["a".to_string(), "b".to_string()]);
    }
}
