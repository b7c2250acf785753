//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. `libsql::Connection` is
//! `Send + Sync` and safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{CURSOR_KEY, Store, SubmittedDelivery};

/// libSQL store backend.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl Store for LibSqlStore {
    async fn load_cursor(&self) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM mail_cursor WHERE key = ?1",
                params![CURSOR_KEY],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_cursor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_cursor row: {e}")))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_cursor: {e}"))),
        }
    }

    async fn save_cursor(&self, state: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO mail_cursor (key, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET state = excluded.state,
                                                updated_at = excluded.updated_at",
                params![CURSOR_KEY, state, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_cursor: {e}")))?;
        debug!(state = %state, "Cursor saved");
        Ok(())
    }

    async fn has_submitted(&self, tracking_number: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM submitted_deliveries WHERE tracking_number = ?1",
                params![tracking_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_submitted: {e}")))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_submitted: {e}"))),
        }
    }

    async fn record_submitted(&self, delivery: &SubmittedDelivery) -> Result<(), DatabaseError> {
        // INSERT OR IGNORE: a ledger row is never overwritten.
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO submitted_deliveries
                 (tracking_number, carrier_code, description, email_id, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    delivery.tracking_number.as_str(),
                    delivery.carrier_code.as_str(),
                    delivery.description.as_str(),
                    delivery.email_id.as_str(),
                    delivery.submitted_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_submitted: {e}")))?;
        debug!(
            tracking_number = %delivery.tracking_number,
            carrier_code = %delivery.carrier_code,
            "Delivery recorded in ledger"
        );
        Ok(())
    }

    async fn submitted_count(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM submitted_deliveries", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("submitted_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("submitted_count row: {e}")))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("submitted_count: {e}"))),
        }
    }
}

/// Fetch a ledger record by tracking number (used by tests and tooling).
impl LibSqlStore {
    pub async fn get_submitted(
        &self,
        tracking_number: &str,
    ) -> Result<Option<SubmittedDelivery>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT tracking_number, carrier_code, description, email_id, submitted_at
                 FROM submitted_deliveries WHERE tracking_number = ?1",
                params![tracking_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_submitted: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let submitted_at: String = row
                    .get(4)
                    .map_err(|e| DatabaseError::Query(format!("get_submitted row: {e}")))?;
                Ok(Some(SubmittedDelivery {
                    tracking_number: row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("get_submitted row: {e}")))?,
                    carrier_code: row
                        .get(1)
                        .map_err(|e| DatabaseError::Query(format!("get_submitted row: {e}")))?,
                    description: row
                        .get(2)
                        .map_err(|e| DatabaseError::Query(format!("get_submitted row: {e}")))?,
                    email_id: row
                        .get(3)
                        .map_err(|e| DatabaseError::Query(format!("get_submitted row: {e}")))?,
                    submitted_at: parse_datetime(&submitted_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_submitted: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(tracking: &str, code: &str) -> SubmittedDelivery {
        SubmittedDelivery {
            tracking_number: tracking.into(),
            carrier_code: code.into(),
            description: "Order".into(),
            email_id: "email-1".into(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), None);

        store.save_cursor("state-1").await.unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), Some("state-1".into()));

        // Upsert replaces the singleton row
        store.save_cursor("state-2").await.unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), Some("state-2".into()));
    }

    #[tokio::test]
    async fn ledger_records_once() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(!store.has_submitted("1Z999").await.unwrap());

        store.record_submitted(&delivery("1Z999", "ups")).await.unwrap();
        assert!(store.has_submitted("1Z999").await.unwrap());
        assert_eq!(store.submitted_count().await.unwrap(), 1);

        // A second record for the same tracking number is ignored,
        // keeping the original row.
        store
            .record_submitted(&delivery("1Z999", "fedex"))
            .await
            .unwrap();
        assert_eq!(store.submitted_count().await.unwrap(), 1);
        let kept = store.get_submitted("1Z999").await.unwrap().unwrap();
        assert_eq!(kept.carrier_code, "ups");
    }

    #[tokio::test]
    async fn ledger_distinct_tracking_numbers() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.record_submitted(&delivery("A1", "ups")).await.unwrap();
        store.record_submitted(&delivery("B2", "cp")).await.unwrap();
        assert_eq!(store.submitted_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.db");

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.save_cursor("persisted").await.unwrap();
            store.record_submitted(&delivery("1Z1", "ups")).await.unwrap();
        }

        let store = LibSqlStore::new_local(&path).await.unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), Some("persisted".into()));
        assert!(store.has_submitted("1Z1").await.unwrap());
    }
}
