//! Pipeline orchestrator — one pass per mailbox change event.
//!
//! A pass walks the full chain: cursor → fetch → classify → extract →
//! resolve → submit → advance cursor. Triggers arriving while a pass is
//! running are dropped, not queued: the in-flight pass already reads up
//! to its fetch-time boundary, so the dropped trigger's work lands in
//! the next pass's wider diff window.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::carriers::CarrierRegistry;
use crate::classify::CandidateClassifier;
use crate::error::{Error, MailError};
use crate::extraction::{DeliveryExtractor, TrackingCandidate};
use crate::jmap::{EmailMessage, MailSource};
use crate::store::Store;
use crate::submit::{SubmissionGate, SubmissionOutcome};

/// Counters for one pass, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassStats {
    /// New emails returned by the synchronizer.
    pub fetched: usize,
    /// Emails that survived the classifier.
    pub candidates: usize,
    /// Tracking candidates produced by extraction.
    pub extracted: usize,
    /// Deliveries accepted downstream this pass.
    pub submitted: usize,
}

/// The event-driven ingestion pipeline.
pub struct DeliveryPipeline {
    mail: Arc<dyn MailSource>,
    store: Arc<dyn Store>,
    classifier: CandidateClassifier,
    extractor: Arc<dyn DeliveryExtractor>,
    registry: Arc<CarrierRegistry>,
    gate: SubmissionGate,
    running: AtomicBool,
}

/// Clears the running flag when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeliveryPipeline {
    pub fn new(
        mail: Arc<dyn MailSource>,
        store: Arc<dyn Store>,
        classifier: CandidateClassifier,
        extractor: Arc<dyn DeliveryExtractor>,
        registry: Arc<CarrierRegistry>,
        gate: SubmissionGate,
    ) -> Self {
        Self {
            mail,
            store,
            classifier,
            extractor,
            registry,
            gate,
            running: AtomicBool::new(false),
        }
    }

    /// Trigger a pass. Returns `None` when the trigger was dropped
    /// (a pass was already running) or the pass failed; failures are
    /// logged, never raised to the listener.
    pub async fn on_mail_state_change(&self) -> Option<PassStats> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Pass already running, dropping trigger");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let pass_id = Uuid::new_v4();
        match self
            .run_pass()
            .instrument(info_span!("pipeline_pass", %pass_id))
            .await
        {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "Pipeline pass failed");
                None
            }
        }
    }

    async fn run_pass(&self) -> Result<PassStats, Error> {
        let mut stats = PassStats::default();

        // First run: seed the cursor without reading any history.
        let Some(cursor) = self.store.load_cursor().await? else {
            info!("No cursor: capturing current mailbox state, skipping history");
            let state = self.mail.current_state().await?;
            self.store.save_cursor(&state).await?;
            info!(state = %state, "Initial cursor saved");
            return Ok(stats);
        };

        let result = match self.mail.fetch_since(&cursor).await {
            Ok(result) => result,
            Err(MailError::CannotCalculateChanges) => {
                // Resynchronize and accept the gap rather than error-loop.
                warn!("Server cannot diff from stored cursor, resynchronizing");
                let state = self.mail.current_state().await?;
                self.store.save_cursor(&state).await?;
                return Ok(stats);
            }
            // Any other fetch failure aborts without advancing the
            // cursor; the next trigger retries the same range.
            Err(e) => return Err(e.into()),
        };

        stats.fetched = result.emails.len();

        let mut kept = Vec::new();
        for email in result.emails {
            if self.classifier.is_candidate(&email).await {
                kept.push(email);
            } else {
                debug!(subject = %email.subject, from = %email.from, "Filtered out");
            }
        }
        stats.candidates = kept.len();

        if !kept.is_empty() {
            info!(
                candidates = kept.len(),
                fetched = stats.fetched,
                "Tracking candidates in new mail"
            );
        } else if stats.fetched > 0 {
            debug!(fetched = stats.fetched, "No tracking candidates in new mail");
        }

        for email in &kept {
            match self.process_email(email).await {
                Ok((extracted, submitted)) => {
                    stats.extracted += extracted;
                    stats.submitted += submitted;
                }
                // One bad email must not abort the batch.
                Err(e) => {
                    error!(
                        subject = %email.subject,
                        error = %e,
                        "Failed to process email, continuing"
                    );
                }
            }
        }

        // The cursor advances after the whole batch regardless of
        // per-candidate outcomes. If the process dies mid-batch the next
        // run re-fetches the same emails and the ledger absorbs the
        // replay.
        self.store.save_cursor(&result.new_state).await?;
        Ok(stats)
    }

    /// Extract and submit everything in one email. Returns
    /// (extracted, submitted) counts.
    async fn process_email(&self, email: &EmailMessage) -> Result<(usize, usize), Error> {
        info!(subject = %email.subject, from = %email.from, "Extracting deliveries");

        let vocabulary = self.registry.vocabulary_lines().await;
        let candidates = self.extractor.extract(email, &vocabulary).await?;
        if candidates.is_empty() {
            debug!(subject = %email.subject, "No tracking numbers found");
            return Ok((0, 0));
        }

        info!(
            count = candidates.len(),
            subject = %email.subject,
            "Found deliveries"
        );

        let mut submitted = 0;
        for candidate in &candidates {
            match self.process_candidate(candidate, &email.id).await {
                Ok(Some(SubmissionOutcome::Submitted)) => submitted += 1,
                Ok(_) => {}
                // Per-candidate isolation mirrors per-email isolation.
                Err(e) => {
                    error!(
                        tracking_number = %candidate.tracking_number,
                        error = %e,
                        "Failed to process delivery, continuing"
                    );
                }
            }
        }
        Ok((candidates.len(), submitted))
    }

    async fn process_candidate(
        &self,
        candidate: &TrackingCandidate,
        email_id: &str,
    ) -> Result<Option<SubmissionOutcome>, Error> {
        let Some(code) = self
            .registry
            .resolve(&candidate.carrier, &candidate.tracking_number)
            .await
        else {
            warn!(
                carrier = %candidate.carrier,
                tracking_number = %candidate.tracking_number,
                "Unresolvable carrier, skipping"
            );
            return Ok(None);
        };

        let outcome = self
            .gate
            .submit_if_new(
                &candidate.tracking_number,
                &code,
                &candidate.description,
                email_id,
            )
            .await?;
        Ok(Some(outcome))
    }
}
