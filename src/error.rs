//! Error types for the intake pipeline.

use std::path::PathBuf;

/// Top-level error type for the intake pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Carrier manifest error: {0}")]
    Carrier(#[from] CarrierError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Mailbox access errors.
///
/// `Connect` is fatal for the whole sweep; everything else isolates to the
/// message being processed.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Cannot connect to mailbox {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Message {seq} is no longer present in the mailbox")]
    MessageGone { seq: u32 },

    #[error("Failed to parse message: {0}")]
    Parse(String),
}

impl From<async_imap::error::Error> for MailboxError {
    fn from(e: async_imap::error::Error) -> Self {
        MailboxError::Protocol(e.to_string())
    }
}

/// Idempotency ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to open ledger database: {0}")]
    Open(String),

    #[error("Ledger query failed: {0}")]
    Db(#[from] libsql::Error),
}

/// Carrier manifest parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read manifest sheet: {0}")]
    Sheet(String),
}

/// Order and file service errors.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Order service error: {0}")]
    Service(String),

    #[error("Invalid order service response: {0}")]
    InvalidResponse(String),

    #[error("File service error: {0}")]
    FileService(String),
}

/// Local archive errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send alert: {0}")]
    Alert(String),

    #[error("Failed to send partner mail: {0}")]
    Mail(String),

    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, IntakeError>;
