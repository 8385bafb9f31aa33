//! The sweep — one sequential pass over the mailbox.
//!
//! Messages are processed in listing order; a message's ledger completion
//! happens-before the next message begins, so a crash mid-sweep leaves at
//! most one message partially processed and a re-run picks it up again.
//! Per-message failures are funneled to the notifier and never abort the
//! sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::archive::{COMPANION_FILENAME, MessageArchive};
use crate::carrier::resolve_carrier;
use crate::classify::{Attachment, classify_parts};
use crate::error::IntakeError;
use crate::ledger::ProcessingLedger;
use crate::mailbox::{MailboxSession, MessageRef, MimeTree};
use crate::notify::ErrorNotifier;
use crate::orders::{
    CreateOrderRequest, DUPLICATE_MARKER, FileService, OrderContext, OrderSubmitter,
};
use crate::partners::{PartnerDirectory, PartnerProfile};
use crate::rules;

/// Counters for one sweep run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Completed end to end this run.
    pub processed: usize,
    /// Unknown sender, permanently discarded.
    pub discarded: usize,
    /// Already completed in the ledger.
    pub skipped: usize,
    /// Left unread for the next sweep.
    pub deferred: usize,
    /// Failed and handed to the error notifier.
    pub failed: usize,
}

enum Outcome {
    Processed,
    Discarded,
    Skipped,
    Deferred,
}

/// Orchestrates one pass over the mailbox.
pub struct Sweep {
    ledger: Arc<ProcessingLedger>,
    partners: Arc<PartnerDirectory>,
    submitter: OrderSubmitter,
    files: Arc<dyn FileService>,
    notifier: ErrorNotifier,
    archive: MessageArchive,
}

impl Sweep {
    pub fn new(
        ledger: Arc<ProcessingLedger>,
        partners: Arc<PartnerDirectory>,
        submitter: OrderSubmitter,
        files: Arc<dyn FileService>,
        notifier: ErrorNotifier,
        archive: MessageArchive,
    ) -> Self {
        Self {
            ledger,
            partners,
            submitter,
            files,
            notifier,
            archive,
        }
    }

    /// Run one sweep against an open session.
    pub async fn run(&self, session: &mut dyn MailboxSession) -> Result<SweepStats, IntakeError> {
        let sweep_start = Utc::now();
        let messages = session.list_messages().await?;
        info!(count = messages.len(), "Sweep started");

        let mut stats = SweepStats::default();
        for message in messages {
            let mut ctx = OrderContext::default();
            match self
                .process_message(session, message, sweep_start, &mut ctx)
                .await
            {
                Ok(Outcome::Processed) => stats.processed += 1,
                Ok(Outcome::Discarded) => stats.discarded += 1,
                Ok(Outcome::Skipped) => stats.skipped += 1,
                Ok(Outcome::Deferred) => stats.deferred += 1,
                Err(err) => {
                    stats.failed += 1;
                    self.handle_failure(session, message, &ctx, &err).await;
                }
            }
        }

        info!(?stats, "Sweep finished");
        Ok(stats)
    }

    async fn process_message(
        &self,
        session: &mut dyn MailboxSession,
        message: MessageRef,
        sweep_start: DateTime<Utc>,
        ctx: &mut OrderContext,
    ) -> Result<Outcome, IntakeError> {
        // A mailbox renumbered mid-sweep must not be read under a stale
        // sequence number.
        if !session.verify_uid(message.uid).await? {
            warn!(
                uid = message.uid,
                seq = message.seq,
                "uid/sequence mismatch, deferring"
            );
            session.mark_unseen(message.seq).await?;
            return Ok(Outcome::Deferred);
        }

        let record = self.ledger.get_or_create(message.uid).await?;
        if record.completed {
            debug!(uid = message.uid, "Already completed, skipping");
            return Ok(Outcome::Skipped);
        }

        let fetched = session.fetch(message.seq).await?;

        // Arrivals after enumeration began are picked up next sweep.
        if fetched.internal_date > sweep_start {
            session.mark_unseen(message.seq).await?;
            return Ok(Outcome::Deferred);
        }

        let Some(profile) = self.partners.resolve(&fetched.sender) else {
            info!(sender = %fetched.sender, uid = message.uid, "Unknown sender, discarding");
            self.ledger.mark_completed(message.uid).await?;
            session.mark_seen(message.seq).await?;
            return Ok(Outcome::Discarded);
        };

        let tree = MimeTree::parse(&fetched.raw)?;
        let attachments = classify_parts(&tree, &fetched.raw);

        if let Some(manifest) = attachments.iter().find(|a| a.is_carrier_manifest) {
            ctx.carrier = resolve_carrier(&manifest.data)?;
            debug!(
                carrier = ctx.carrier.as_deref().unwrap_or("-"),
                "Carrier manifest resolved"
            );
        }

        let archive_date = sweep_start.date_naive();
        for attachment in &attachments {
            let filename = attachment
                .name
                .clone()
                .unwrap_or_else(|| format!("{}.dat", Utc::now().timestamp()));
            self.archive
                .save_attachment(archive_date, message.seq, &filename, &attachment.data)?;
            if let Some(raw) = &attachment.companion_raw {
                self.archive
                    .save_attachment(archive_date, message.seq, COMPANION_FILENAME, raw)?;
            }
            if attachment.is_data_file {
                self.process_data_file(ctx, profile, attachment, &filename)
                    .await?;
            }
        }

        if ctx.order_id.is_some() {
            self.upload_order_files(ctx, &attachments).await?;
        }

        self.ledger.mark_completed(message.uid).await?;
        session.mark_seen(message.seq).await?;
        info!(
            uid = message.uid,
            order_id = ctx.order_id.as_deref().unwrap_or("-"),
            "Message completed"
        );
        Ok(Outcome::Processed)
    }

    /// Run the document rules over one data file and submit an order when
    /// they produce one. Unrecognized filenames and dateless records skip
    /// order creation without failing the message.
    async fn process_data_file(
        &self,
        ctx: &mut OrderContext,
        profile: &PartnerProfile,
        attachment: &Attachment,
        filename: &str,
    ) -> Result<(), IntakeError> {
        let text = rules::decode_legacy(&attachment.data);
        if let Some(wms_id) = profile.match_content(&text) {
            ctx.partner_wms_id = Some(wms_id.to_string());
        }

        let Some(direction) = rules::direction_for(filename) else {
            debug!(filename, "No order implied by filename, archiving only");
            return Ok(());
        };
        ctx.direction = Some(direction);

        let Some(date) = rules::document_date(&text) else {
            debug!(filename, "No document date found, skipping order creation");
            return Ok(());
        };

        let request = CreateOrderRequest {
            company: ctx.partner_wms_id.clone(),
            receipt: direction.order_type().to_string(),
            file_name: filename.to_string(),
            file_data: attachment.data.clone(),
            shipment_date: date.clone(),
            delivery_date: date,
        };
        self.submitter.submit(ctx, direction, request).await
    }

    /// Upload the message's remaining attachments to the confirmed order.
    /// For a data file the companion raw message is uploaded in its place.
    async fn upload_order_files(
        &self,
        ctx: &OrderContext,
        attachments: &[Attachment],
    ) -> Result<(), IntakeError> {
        let Some(order_id) = ctx.order_id.as_deref() else {
            return Ok(());
        };
        let Some(direction) = ctx.direction else {
            return Ok(());
        };
        let partner_id = ctx.partner_wms_id.as_deref().unwrap_or("unknown");

        for attachment in attachments {
            let (name, data): (&str, &[u8]) =
                match (&attachment.companion_raw, attachment.name.as_deref()) {
                    (Some(raw), _) => (COMPANION_FILENAME, raw.as_slice()),
                    (None, Some(name)) => (name, attachment.data.as_slice()),
                    (None, None) => continue,
                };

            let timestamp = Utc::now().timestamp();
            let stored = self
                .files
                .upload(name, data, direction, partner_id, timestamp, Some(order_id))
                .await?;
            let stored_name = format!(
                "{}_{}_{}.{}",
                stored.id, partner_id, timestamp, stored.extension
            );
            self.archive.save_order_file(direction, &stored_name, data)?;
        }
        Ok(())
    }

    /// Compensate a failed message: duplicates are abandoned for good and
    /// the partner is told; anything else goes back to unread for the next
    /// sweep. Operators hear about every failure.
    async fn handle_failure(
        &self,
        session: &mut dyn MailboxSession,
        message: MessageRef,
        ctx: &OrderContext,
        err: &IntakeError,
    ) {
        error!(
            uid = message.uid,
            seq = message.seq,
            "Message processing failed: {err}"
        );
        let text = err.to_string();

        if text.contains(DUPLICATE_MARKER) {
            // The document already exists in the WMS; retrying cannot
            // succeed.
            if let Err(e) = self.ledger.mark_completed(message.uid).await {
                error!("Failed to complete ledger record for duplicate: {e}");
            }
            let label = ctx
                .direction
                .map(|d| d.error_label())
                .unwrap_or("заявки");
            let sent = self
                .notifier
                .notify_partner(ctx.partner_wms_id.as_deref(), &text, label)
                .await;
            debug!(sent, "Partner notifications sent");
        } else if let Err(e) = session.mark_unseen(message.seq).await {
            error!("Failed to re-mark message unread: {e}");
        }

        self.notifier.alert_operator(message.seq, &text).await;
    }
}
