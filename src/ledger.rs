//! Idempotency ledger — durable record of processed mailbox messages.
//!
//! One row per sighted message uid. A record flips to completed only after
//! every side effect of its message has landed, and is never deleted, so a
//! re-run of the sweep skips everything already done.

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::info;

use crate::error::LedgerError;

/// Processing state of one mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingRecord {
    pub message_uid: u32,
    pub completed: bool,
}

/// SQLite-backed ledger. Exclusive writer of `emails_read`.
pub struct ProcessingLedger {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Connection,
}

impl ProcessingLedger {
    /// Open (or create) the local ledger database.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Open(format!("failed to create ledger dir: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        let ledger = Self { db, conn };
        ledger.init_schema().await?;
        info!(path = %path.display(), "Ledger opened");
        Ok(ledger)
    }

    /// In-memory ledger (for tests).
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        let ledger = Self { db, conn };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS emails_read (
                    email_id INTEGER PRIMARY KEY,
                    completed INTEGER NOT NULL DEFAULT 0
                )",
                (),
            )
            .await?;
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS order_log (
                    wms_id TEXT NOT NULL,
                    company_id TEXT,
                    order_type TEXT NOT NULL,
                    user_id INTEGER NOT NULL,
                    unit TEXT NOT NULL,
                    action TEXT NOT NULL,
                    value TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                (),
            )
            .await?;
        Ok(())
    }

    /// Fetch the record for `uid`, creating an incomplete one on first
    /// sighting.
    pub async fn get_or_create(&self, uid: u32) -> Result<ProcessingRecord, LedgerError> {
        let mut rows = self
            .conn
            .query(
                "SELECT completed FROM emails_read WHERE email_id = ?1",
                params![uid as i64],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            let completed: i64 = row.get(0)?;
            return Ok(ProcessingRecord {
                message_uid: uid,
                completed: completed != 0,
            });
        }

        self.conn
            .execute(
                "INSERT INTO emails_read (email_id, completed) VALUES (?1, 0)",
                params![uid as i64],
            )
            .await?;
        Ok(ProcessingRecord {
            message_uid: uid,
            completed: false,
        })
    }

    /// Mark a message fully processed. Idempotent.
    pub async fn mark_completed(&self, uid: u32) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "UPDATE emails_read SET completed = 1 WHERE email_id = ?1",
                params![uid as i64],
            )
            .await?;
        Ok(())
    }

    /// Audit entry for a confirmed order (actor 0 is the system).
    pub async fn log_order(
        &self,
        wms_id: &str,
        company_id: &str,
        order_type: &str,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "INSERT INTO order_log
                    (wms_id, company_id, order_type, user_id, unit, action, value, created_at)
                 VALUES (?1, ?2, ?3, 0, 'order', 'create', ?4, ?5)",
                params![
                    wms_id,
                    company_id,
                    order_type,
                    at.format("%d.%m.%Y %H:%M:%S").to_string(),
                    at.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Number of audit entries (for tests and diagnostics).
    pub async fn order_log_count(&self) -> Result<u64, LedgerError> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM order_log", ()).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| LedgerError::Open("empty COUNT result".to_string()))?;
        let count: i64 = row.get(0)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sighting_creates_incomplete_record() {
        let ledger = ProcessingLedger::in_memory().await.unwrap();
        let record = ledger.get_or_create(42).await.unwrap();
        assert_eq!(record.message_uid, 42);
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn retries_reuse_the_existing_record() {
        let ledger = ProcessingLedger::in_memory().await.unwrap();
        ledger.get_or_create(42).await.unwrap();
        ledger.mark_completed(42).await.unwrap();

        let record = ledger.get_or_create(42).await.unwrap();
        assert!(record.completed);
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let ledger = ProcessingLedger::in_memory().await.unwrap();
        ledger.get_or_create(7).await.unwrap();
        ledger.mark_completed(7).await.unwrap();
        ledger.mark_completed(7).await.unwrap();
        assert!(ledger.get_or_create(7).await.unwrap().completed);
    }

    #[tokio::test]
    async fn order_log_records_entries() {
        let ledger = ProcessingLedger::in_memory().await.unwrap();
        ledger
            .log_order("order-1", "wms-1", "incoming", Utc::now())
            .await
            .unwrap();
        assert_eq!(ledger.order_log_count().await.unwrap(), 1);
    }
}
