//! Delivery submission: idempotency gate plus the external tracker call.
//!
//! Outcomes are a closed set so callers can't mishandle an unanticipated
//! case. A permanent rejection (4xx) is recorded in the ledger like a
//! success — it will never succeed on retry; a transient failure is not
//! recorded, leaving the number eligible if the same email resurfaces.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};

use crate::carriers::{CarrierRegistry, exclusions};
use crate::config::SubmitConfig;
use crate::error::DatabaseError;
use crate::store::{Store, SubmittedDelivery};

/// Wire payload for the submission POST.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    pub tracking_number: String,
    pub carrier_code: String,
    pub description: String,
    /// Ask the tracker to confirm the new delivery with a push.
    pub send_push_confirmation: bool,
}

/// Result of one submission POST.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitStatus {
    /// 2xx — the tracker accepted the delivery.
    Accepted,
    /// 4xx — permanently rejected, never worth retrying.
    Rejected(u16),
    /// Network error, timeout, or 5xx — might succeed later.
    Transient(String),
}

/// Submission port.
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    async fn submit(&self, delivery: &DeliveryRequest) -> SubmitStatus;
}

/// `SubmissionApi` over the tracker's add-delivery endpoint.
pub struct ParcelClient {
    client: reqwest::Client,
    config: SubmitConfig,
}

impl ParcelClient {
    pub fn new(client: reqwest::Client, config: SubmitConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl SubmissionApi for ParcelClient {
    async fn submit(&self, delivery: &DeliveryRequest) -> SubmitStatus {
        let result = self
            .client
            .post(&self.config.url)
            .header("api-key", self.config.api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(delivery)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(
                        tracking_number = %delivery.tracking_number,
                        carrier_code = %delivery.carrier_code,
                        status = status.as_u16(),
                        "Delivery submitted"
                    );
                    SubmitStatus::Accepted
                } else if status.is_client_error() {
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        tracking_number = %delivery.tracking_number,
                        status = status.as_u16(),
                        response = %body,
                        "Delivery rejected"
                    );
                    SubmitStatus::Rejected(status.as_u16())
                } else {
                    SubmitStatus::Transient(format!("HTTP {}", status.as_u16()))
                }
            }
            Err(e) => SubmitStatus::Transient(e.to_string()),
        }
    }
}

/// Outcome of `submit_if_new` — the full closed set of what can happen
/// to a resolved delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Already in the ledger; no network call was made.
    Duplicate,
    /// Carrier code absent from the current vocabulary; skipped, not
    /// recorded, not retried (cache-driven, not re-queued).
    InvalidCarrier,
    /// Carrier tracked through the recipient's own account; skipped.
    SelfTracked,
    /// Accepted downstream and recorded in the ledger.
    Submitted,
    /// Permanently rejected downstream; recorded so it is never retried.
    Rejected(u16),
    /// Transient failure; not recorded, eligible for a future attempt.
    Transient,
}

/// Idempotency gate in front of the submission API.
pub struct SubmissionGate {
    store: Arc<dyn Store>,
    registry: Arc<CarrierRegistry>,
    api: Arc<dyn SubmissionApi>,
}

impl SubmissionGate {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<CarrierRegistry>,
        api: Arc<dyn SubmissionApi>,
    ) -> Self {
        Self {
            store,
            registry,
            api,
        }
    }

    /// Submit a delivery unless the ledger or a skip policy says not to.
    pub async fn submit_if_new(
        &self,
        tracking_number: &str,
        carrier_code: &str,
        description: &str,
        email_id: &str,
    ) -> Result<SubmissionOutcome, DatabaseError> {
        // Duplicate check first: a hit costs no network call.
        if self.store.has_submitted(tracking_number).await? {
            info!(tracking_number, "Duplicate tracking number, skipping");
            return Ok(SubmissionOutcome::Duplicate);
        }

        if !self.registry.is_valid_code(carrier_code).await {
            warn!(
                tracking_number,
                carrier_code, "Carrier code not in vocabulary, skipping"
            );
            return Ok(SubmissionOutcome::InvalidCarrier);
        }

        // Amazon tracks its own deliveries through the account login.
        if exclusions::is_self_tracked(carrier_code) {
            info!(tracking_number, carrier_code, "Self-tracked carrier, skipping");
            return Ok(SubmissionOutcome::SelfTracked);
        }

        let request = DeliveryRequest {
            tracking_number: tracking_number.to_string(),
            carrier_code: carrier_code.to_string(),
            description: description.to_string(),
            send_push_confirmation: true,
        };

        match self.api.submit(&request).await {
            SubmitStatus::Accepted => {
                self.record(tracking_number, carrier_code, description, email_id)
                    .await?;
                Ok(SubmissionOutcome::Submitted)
            }
            SubmitStatus::Rejected(status) => {
                // Recorded on purpose: a 4xx will fail identically forever.
                self.record(tracking_number, carrier_code, description, email_id)
                    .await?;
                Ok(SubmissionOutcome::Rejected(status))
            }
            SubmitStatus::Transient(reason) => {
                warn!(
                    tracking_number,
                    reason = %reason,
                    "Transient submission failure, delivery dropped for now"
                );
                Ok(SubmissionOutcome::Transient)
            }
        }
    }

    async fn record(
        &self,
        tracking_number: &str,
        carrier_code: &str,
        description: &str,
        email_id: &str,
    ) -> Result<(), DatabaseError> {
        self.store
            .record_submitted(&SubmittedDelivery {
                tracking_number: tracking_number.to_string(),
                carrier_code: carrier_code.to_string(),
                description: description.to_string(),
                email_id: email_id.to_string(),
                submitted_at: Utc::now(),
            })
            .await
    }
}
