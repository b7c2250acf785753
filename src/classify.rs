//! Candidate classifier — cheap tiered filter deciding whether a message
//! is worth the extraction call.
//!
//! Tiers short-circuit in order: blocked sender, known shipping sender,
//! tracking keyword, carrier-name mention. Only the last tier touches the
//! carrier vocabulary, so obviously irrelevant mail never populates the
//! cache.

use std::sync::Arc;

use tracing::debug;

use crate::carriers::CarrierRegistry;
use crate::jmap::EmailMessage;

/// Senders that are transactional but never shipping-related; these are
/// rejected even when the body happens to contain tracking keywords.
const BLOCKED_SENDERS: &[&str] = &[
    "@paypal.",
    "@stripe.com",
    "@interac.ca",
    "@uber.com",
    "@lyft.com",
    "@doordash.com",
    "@ubereats.com",
    "@skipthedishes.",
    "@instacart.",
    "notifications@github.com",
];

/// Known carrier and shipping-platform sender domains; auto-accept.
const CARRIER_SENDERS: &[&str] = &[
    "@amazon.",
    "@ups.com",
    "@fedex.com",
    "@usps.com",
    "@dhl.com",
    "@canadapost.",
    "@purolator.com",
    "@intelcom.",
    "@shopify.com",
    "@shop.app",
    "@narvar.com",
    "@aftership.com",
];

/// Phrases that mark shipping notifications from unknown senders.
const TRACKING_KEYWORDS: &[&str] = &[
    "tracking",
    "shipped",
    "out for delivery",
    "tracking number",
    "order shipped",
    "in transit",
    "shipment",
    "estimated delivery",
    "delivery confirmation",
    "package",
];

/// Tiered tracking-candidate classifier.
pub struct CandidateClassifier {
    registry: Arc<CarrierRegistry>,
    blocked_senders: Vec<String>,
    carrier_senders: Vec<String>,
    keywords: Vec<String>,
}

impl CandidateClassifier {
    pub fn new(registry: Arc<CarrierRegistry>) -> Self {
        Self {
            registry,
            blocked_senders: BLOCKED_SENDERS.iter().map(|s| s.to_string()).collect(),
            carrier_senders: CARRIER_SENDERS.iter().map(|s| s.to_string()).collect(),
            keywords: TRACKING_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether this email is worth the extraction call.
    pub async fn is_candidate(&self, email: &EmailMessage) -> bool {
        let from = email.from.to_lowercase();

        // Tier 1: blocked senders lose outright, keywords or not.
        if self.blocked_senders.iter().any(|s| from.contains(s)) {
            debug!(from = %email.from, "Sender is blocked, rejecting");
            return false;
        }

        // Tier 2: known carrier/shipping senders auto-pass.
        if self.carrier_senders.iter().any(|s| from.contains(s)) {
            return true;
        }

        // Tier 3: keyword match in subject or body.
        let text = format!("{} {}", email.subject, email.text_body).to_lowercase();
        if self.keywords.iter().any(|k| text.contains(k)) {
            return true;
        }

        // Tier 4: a known carrier's display name mentioned as a whole
        // word anywhere in the subject or body.
        for pattern in self.registry.name_patterns().await {
            if pattern.is_match(&text) {
                debug!(from = %email.from, "Carrier name mention, accepting");
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carriers::registry::CarrierEntry;

    fn registry() -> Arc<CarrierRegistry> {
        Arc::new(CarrierRegistry::with_entries(vec![
            CarrierEntry {
                code: "puro".into(),
                name: "Purolator".into(),
            },
            CarrierEntry {
                code: "cp".into(),
                name: "Canada Post".into(),
            },
        ]))
    }

    fn email(from: &str, subject: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: "m1".into(),
            from: from.into(),
            subject: subject.into(),
            text_body: body.into(),
            received_at: None,
        }
    }

    #[tokio::test]
    async fn accepts_known_carrier_senders() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            classifier
                .is_candidate(&email(
                    "shipment-tracking@amazon.com",
                    "Your order",
                    "Here is your order confirmation.",
                ))
                .await
        );
        assert!(
            classifier
                .is_candidate(&email("noreply@ups.com", "Delivery update", ""))
                .await
        );
    }

    #[tokio::test]
    async fn carrier_sender_match_is_case_insensitive() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            classifier
                .is_candidate(&email("noreply@FedEx.com", "Update", ""))
                .await
        );
    }

    #[tokio::test]
    async fn matches_amazon_subdomains() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            classifier
                .is_candidate(&email("ship-confirm@amazon.co.uk", "Your order", ""))
                .await
        );
    }

    #[tokio::test]
    async fn accepts_keywords_in_subject_or_body() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            classifier
                .is_candidate(&email(
                    "orders@somestore.com",
                    "Your order has shipped!",
                    "Thank you for your purchase.",
                ))
                .await
        );
        assert!(
            classifier
                .is_candidate(&email(
                    "orders@somestore.com",
                    "Order confirmation",
                    "Your tracking number is 1Z999AA10123456784",
                ))
                .await
        );
        assert!(
            classifier
                .is_candidate(&email(
                    "orders@somestore.com",
                    "YOUR ORDER HAS SHIPPED",
                    "",
                ))
                .await
        );
        assert!(
            classifier
                .is_candidate(&email("orders@somestore.com", "Your package is in transit", ""))
                .await
        );
    }

    #[tokio::test]
    async fn blocked_sender_beats_keywords() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            !classifier
                .is_candidate(&email(
                    "receipts@paypal.com",
                    "Your payment",
                    "Your package tracking details are attached.",
                ))
                .await
        );
    }

    #[tokio::test]
    async fn accepts_carrier_name_mention_as_whole_word() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            classifier
                .is_candidate(&email(
                    "orders@somestore.com",
                    "Your order is on its way",
                    "Handed to Purolator for final-mile service.",
                ))
                .await
        );
    }

    #[tokio::test]
    async fn rejects_unrelated_mail() {
        let classifier = CandidateClassifier::new(registry());
        assert!(
            !classifier
                .is_candidate(&email(
                    "newsletter@example.com",
                    "Weekly digest",
                    "Here are this week's top stories.",
                ))
                .await
        );
        assert!(
            !classifier
                .is_candidate(&email(
                    "marketing@store.com",
                    "50% off sale!",
                    "Don't miss our biggest sale of the year.",
                ))
                .await
        );
    }
}
