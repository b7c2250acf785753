//! Backend-agnostic `Store` trait for the cursor and the dedup ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Fixed key for the singleton cursor row.
pub const CURSOR_KEY: &str = "mailbox";

/// A ledger record: one delivery that was submitted (or permanently
/// rejected) downstream. At most one record per tracking number, ever.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedDelivery {
    pub tracking_number: String,
    pub carrier_code: String,
    pub description: String,
    /// Mail id of the message the delivery was extracted from.
    pub email_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Persistence port for the pipeline.
///
/// Both records are single-writer (only the pipeline writes them), so the
/// backend needs nothing beyond atomic upsert-by-key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the persisted mail sync cursor, if any.
    async fn load_cursor(&self) -> Result<Option<String>, DatabaseError>;

    /// Persist a new cursor value, replacing any previous one.
    async fn save_cursor(&self, state: &str) -> Result<(), DatabaseError>;

    /// Whether a delivery with this tracking number was already recorded.
    async fn has_submitted(&self, tracking_number: &str) -> Result<bool, DatabaseError>;

    /// Record a submitted delivery. A record that already exists for the
    /// tracking number is left untouched.
    async fn record_submitted(&self, delivery: &SubmittedDelivery) -> Result<(), DatabaseError>;

    /// Number of ledger records (observability).
    async fn submitted_count(&self) -> Result<u64, DatabaseError>;
}
