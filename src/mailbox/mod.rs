//! Mailbox access — session contract and the MIME structure model.
//!
//! The sweep talks to the mailbox through [`MailboxSession`] so tests can
//! drive the pipeline without a live IMAP server. Message identity is the
//! server-stable uid; sequence numbers are transient and re-verified before
//! any message is touched.

pub mod imap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::MailboxError;

/// A message as enumerated at sweep start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    /// Transient sequence number, valid only while the mailbox is unchanged.
    pub seq: u32,
    /// Server-stable unique id.
    pub uid: u32,
}

/// A fully fetched message.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Envelope sender as `mailbox@host`.
    pub sender: String,
    /// Server INTERNALDATE.
    pub internal_date: DateTime<Utc>,
    /// Full headers + body as delivered by the server.
    pub raw: Vec<u8>,
}

/// Stateful connection to one mailbox.
#[async_trait]
pub trait MailboxSession: Send {
    /// Enumerate all messages, sequence-ascending.
    async fn list_messages(&mut self) -> Result<Vec<MessageRef>, MailboxError>;

    /// Re-derive the current sequence number for `uid` and check that it
    /// still maps back to the same uid. `false` means the mailbox was
    /// renumbered under us and the message must be skipped this sweep.
    async fn verify_uid(&mut self, uid: u32) -> Result<bool, MailboxError>;

    /// Fetch the full message under its current sequence number.
    async fn fetch(&mut self, seq: u32) -> Result<FetchedMessage, MailboxError>;

    async fn mark_seen(&mut self, seq: u32) -> Result<(), MailboxError>;

    async fn mark_unseen(&mut self, seq: u32) -> Result<(), MailboxError>;

    async fn logout(&mut self) -> Result<(), MailboxError>;
}

/// One MIME part of a multipart message, in part order.
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Zero-based position among the root's children.
    pub index: usize,
    /// Lowercase media subtype.
    pub subtype: String,
    /// `filename` parameter of the Content-Disposition header.
    pub disposition_filename: Option<String>,
    /// `name` parameter of the Content-Type header.
    pub name_param: Option<String>,
    /// Transfer-decoded contents. base64 and quoted-printable are decoded
    /// by the parser; any other encoding passes through unmodified.
    pub data: Vec<u8>,
}

/// Flat view over the top-level parts of a message.
#[derive(Debug, Clone, Default)]
pub struct MimeTree {
    pub parts: Vec<MimePart>,
}

impl MimeTree {
    /// Parse the raw message and extract its top-level parts.
    ///
    /// A non-multipart message has no parts to classify and yields an
    /// empty tree.
    pub fn parse(raw: &[u8]) -> Result<Self, MailboxError> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| MailboxError::Parse("unparseable MIME message".to_string()))?;

        let mut parts = Vec::new();
        if let Some(root) = message.parts.first()
            && let PartType::Multipart(children) = &root.body
        {
            for (index, child_id) in children.iter().enumerate() {
                let Some(part) = message.parts.get(*child_id as usize) else {
                    continue;
                };
                let subtype = part
                    .content_type()
                    .and_then(|ct| ct.subtype())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let disposition_filename = part
                    .content_disposition()
                    .and_then(|cd| cd.attribute("filename"))
                    .map(str::to_string);
                let name_param = part
                    .content_type()
                    .and_then(|ct| ct.attribute("name"))
                    .map(str::to_string);
                parts.push(MimePart {
                    index,
                    subtype,
                    disposition_filename,
                    name_param,
                    data: part.contents().to_vec(),
                });
            }
        }
        Ok(Self { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "N123;40;2;2024-05-01;10:30:00;rest of record" in base64.
    const DATA_B64: &str = "TjEyMzs0MDsyOzIwMjQtMDUtMDE7MTA6MzA6MDA7cmVzdCBvZiByZWNvcmQ=";

    fn multipart_fixture() -> Vec<u8> {
        format!(
            "From: erp@partner.test\r\n\
             To: office@warehouse.test\r\n\
             Subject: orders\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"bnd42\"\r\n\
             \r\n\
             --bnd42\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             see attached\r\n\
             --bnd42\r\n\
             Content-Type: application/octet-stream; name=\"in2024.dat\"\r\n\
             Content-Disposition: attachment; filename=\"in2024.dat\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {DATA_B64}\r\n\
             --bnd42--\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn parse_extracts_top_level_parts_in_order() {
        let tree = MimeTree::parse(&multipart_fixture()).unwrap();
        assert_eq!(tree.parts.len(), 2);
        assert_eq!(tree.parts[0].index, 0);
        assert_eq!(tree.parts[0].subtype, "plain");
        assert_eq!(tree.parts[1].subtype, "octet-stream");
    }

    #[test]
    fn parse_decodes_base64_contents() {
        let tree = MimeTree::parse(&multipart_fixture()).unwrap();
        let part = &tree.parts[1];
        assert_eq!(
            part.data,
            b"N123;40;2;2024-05-01;10:30:00;rest of record".to_vec()
        );
    }

    #[test]
    fn parse_reads_both_filename_sources() {
        let tree = MimeTree::parse(&multipart_fixture()).unwrap();
        let part = &tree.parts[1];
        assert_eq!(part.disposition_filename.as_deref(), Some("in2024.dat"));
        assert_eq!(part.name_param.as_deref(), Some("in2024.dat"));
    }

    #[test]
    fn parse_single_part_message_yields_empty_tree() {
        let raw = b"From: a@b.test\r\nSubject: hi\r\n\r\nplain body\r\n";
        let tree = MimeTree::parse(raw).unwrap();
        assert!(tree.parts.is_empty());
    }
}
