//! Extraction boundary — turns email text into structured tracking
//! candidates via an external text-understanding service.
//!
//! The pipeline treats extraction as a pure function: email in, candidate
//! list out, or failure. The language understanding itself lives on the
//! far side of the HTTP boundary.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::jmap::EmailMessage;

/// Body character budget sent to the extraction service.
pub const MAX_BODY_CHARS: usize = 3000;

/// One tracking record extracted from an email. Transient: exists only
/// within a pipeline pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingCandidate {
    pub tracking_number: String,
    /// Free-text carrier identity: a canonical code or a display name,
    /// whichever the extractor produced.
    #[serde(alias = "carrier_code", alias = "carrier_name")]
    pub carrier: String,
    #[serde(default)]
    pub description: String,
}

/// Extraction port.
#[async_trait]
pub trait DeliveryExtractor: Send + Sync {
    /// Extract tracking candidates from one email. `vocabulary` is the
    /// current carrier list rendered as `code: name` lines.
    async fn extract(
        &self,
        email: &EmailMessage,
        vocabulary: &str,
    ) -> Result<Vec<TrackingCandidate>, ExtractionError>;
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    deliveries: Vec<TrackingCandidate>,
}

/// `DeliveryExtractor` over an external structured-extraction endpoint.
pub struct HttpExtractor {
    client: reqwest::Client,
    config: ExtractionConfig,
}

impl HttpExtractor {
    pub fn new(client: reqwest::Client, config: ExtractionConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DeliveryExtractor for HttpExtractor {
    async fn extract(
        &self,
        email: &EmailMessage,
        vocabulary: &str,
    ) -> Result<Vec<TrackingCandidate>, ExtractionError> {
        let body: String = email.text_body.chars().take(MAX_BODY_CHARS).collect();
        let payload = json!({
            "from": email.from,
            "subject": email.subject,
            "body": body,
            "carriers": vocabulary,
        });

        let response = self
            .client
            .post(&self.config.url)
            .header("api-key", self.config.api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::Request(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let parsed: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        debug!(
            email_id = %email.id,
            candidates = parsed.deliveries.len(),
            "Extraction complete"
        );
        Ok(parsed.deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_accepts_carrier_field_aliases() {
        let with_code: TrackingCandidate = serde_json::from_str(
            r#"{"tracking_number": "1Z1", "carrier_code": "ups", "description": "Order"}"#,
        )
        .unwrap();
        assert_eq!(with_code.carrier, "ups");

        let with_name: TrackingCandidate = serde_json::from_str(
            r#"{"tracking_number": "1Z1", "carrier_name": "Canada Post"}"#,
        )
        .unwrap();
        assert_eq!(with_name.carrier, "Canada Post");
        assert_eq!(with_name.description, "");
    }

    #[test]
    fn response_defaults_to_empty_deliveries() {
        let parsed: ExtractionResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.deliveries.is_empty());
    }

    #[test]
    fn body_budget_respects_char_boundaries() {
        let body = "é".repeat(MAX_BODY_CHARS + 100);
        let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
        assert_eq!(truncated.chars().count(), MAX_BODY_CHARS);
    }
}
