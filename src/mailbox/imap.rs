//! IMAP implementation of the mailbox session.

use async_imap::Session;
use chrono::Utc;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_native_tls::native_tls::TlsConnector;
use tracing::{debug, info};

use super::{FetchedMessage, MailboxSession, MessageRef};
use crate::config::IntakeConfig;
use crate::error::MailboxError;

type TlsSession = Session<tokio_native_tls::TlsStream<TcpStream>>;

/// Live IMAP session over TLS, selected on INBOX.
pub struct ImapMailbox {
    session: TlsSession,
}

impl ImapMailbox {
    /// Connect, authenticate and select INBOX.
    pub async fn connect(config: &IntakeConfig) -> Result<Self, MailboxError> {
        let host = config.imap_host.as_str();
        let connect_err = |reason: String| MailboxError::Connect {
            host: host.to_string(),
            reason,
        };

        let tcp = TcpStream::connect((host, config.imap_port))
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        // The partner mailbox presents a self-signed certificate.
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| connect_err(e.to_string()))?;
        let tls = tokio_native_tls::TlsConnector::from(tls);
        let tls_stream = tls
            .connect(host, tcp)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let client = async_imap::Client::new(tls_stream);
        let mut session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|(e, _)| connect_err(format!("login failed: {e}")))?;
        session.select("INBOX").await?;

        info!(host, "Mailbox session opened");
        Ok(Self { session })
    }

    async fn store_flags(&mut self, seq: u32, flags: &str) -> Result<(), MailboxError> {
        let mut responses = self.session.store(seq.to_string(), flags).await?;
        while let Some(item) = responses.next().await {
            item?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MailboxSession for ImapMailbox {
    async fn list_messages(&mut self) -> Result<Vec<MessageRef>, MailboxError> {
        let mut seqs: Vec<u32> = self.session.search("ALL").await?.into_iter().collect();
        seqs.sort_unstable();
        if seqs.is_empty() {
            return Ok(Vec::new());
        }

        let set = seqs
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut refs = Vec::with_capacity(seqs.len());
        {
            let mut fetches = self.session.fetch(&set, "(UID)").await?;
            while let Some(item) = fetches.next().await {
                let f = item?;
                if let Some(uid) = f.uid {
                    refs.push(MessageRef {
                        seq: f.message,
                        uid,
                    });
                }
            }
        }
        refs.sort_unstable_by_key(|m| m.seq);
        debug!(count = refs.len(), "Mailbox listing complete");
        Ok(refs)
    }

    async fn verify_uid(&mut self, uid: u32) -> Result<bool, MailboxError> {
        let seqs = self.session.search(format!("UID {uid}")).await?;
        let Some(&seq) = seqs.iter().next() else {
            return Ok(false);
        };

        let mut check = None;
        {
            let mut fetches = self.session.fetch(seq.to_string(), "(UID)").await?;
            while let Some(item) = fetches.next().await {
                let f = item?;
                check = f.uid;
            }
        }
        Ok(check == Some(uid))
    }

    async fn fetch(&mut self, seq: u32) -> Result<FetchedMessage, MailboxError> {
        let mut sender = None;
        let mut internal_date = None;
        let mut raw = None;
        {
            let mut fetches = self
                .session
                .fetch(seq.to_string(), "(UID INTERNALDATE ENVELOPE BODY.PEEK[])")
                .await?;
            while let Some(item) = fetches.next().await {
                let f = item?;
                if let Some(env) = f.envelope() {
                    sender = envelope_sender(env);
                }
                if let Some(date) = f.internal_date() {
                    internal_date = Some(date.with_timezone(&Utc));
                }
                if let Some(body) = f.body() {
                    raw = Some(body.to_vec());
                }
            }
        }

        let raw = raw.ok_or(MailboxError::MessageGone { seq })?;
        Ok(FetchedMessage {
            sender: sender.unwrap_or_default(),
            // No INTERNALDATE means we cannot prove the message predates the
            // sweep; treat it as just-arrived so it gets deferred.
            internal_date: internal_date.unwrap_or_else(Utc::now),
            raw,
        })
    }

    async fn mark_seen(&mut self, seq: u32) -> Result<(), MailboxError> {
        self.store_flags(seq, "+FLAGS (\\Seen)").await
    }

    async fn mark_unseen(&mut self, seq: u32) -> Result<(), MailboxError> {
        self.store_flags(seq, "-FLAGS (\\Seen)").await
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        self.session.logout().await?;
        Ok(())
    }
}

/// Format the first envelope sender as `mailbox@host`.
fn envelope_sender(env: &async_imap::imap_proto::Envelope<'_>) -> Option<String> {
    let addr = env.from.as_ref()?.first()?;
    let mailbox = addr
        .mailbox
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).to_string())?;
    let host = addr
        .host
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).to_string())?;
    Some(format!("{mailbox}@{host}"))
}
