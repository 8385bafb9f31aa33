//! Mail Intake — partner email ingestion into warehouse orders.
//!
//! One invocation runs a single sweep: enumerate the partner mailbox over
//! IMAP, classify each message's attachments, turn recognized data files
//! into WMS orders, and prune expired local archives. The idempotency
//! ledger guarantees a message is processed to completion at most once.

pub mod archive;
pub mod carrier;
pub mod classify;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mailbox;
pub mod notify;
pub mod orders;
pub mod partners;
pub mod rules;
pub mod sweep;
