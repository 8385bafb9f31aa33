//! Attachment classification — decides which MIME parts carry order data.

use crate::mailbox::MimeTree;

/// Media subtype of the generic binary files partner ERPs export.
const DATA_FILE_SUBTYPE: &str = "octet-stream";
/// Media subtype of OOXML spreadsheets.
const SPREADSHEET_SUBTYPE: &str = "vnd.openxmlformats-officedocument.spreadsheetml.sheet";
/// Marker phrase in a transport-request spreadsheet filename.
const CARRIER_MANIFEST_MARKER: &str = "транспортная заявка";

/// One classified attachment, index-aligned with the MIME part order.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub index: usize,
    /// Archive filename: Content-Type `name`, falling back to the
    /// disposition filename.
    pub name: Option<String>,
    /// Transfer-decoded contents.
    pub data: Vec<u8>,
    /// Generic binary part carrying structured order data.
    pub is_data_file: bool,
    /// Transport-request spreadsheet naming the shipping carrier.
    pub is_carrier_manifest: bool,
    /// Full raw message (headers + body), captured alongside a data file to
    /// preserve the provenance of the original email.
    pub companion_raw: Option<Vec<u8>>,
}

/// Classify the top-level parts of a message.
///
/// Parts without a filename in either header are not attachments and are
/// dropped. At most one part per message is flagged as the carrier
/// manifest; later matches keep only their archival role.
pub fn classify_parts(tree: &MimeTree, raw_message: &[u8]) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    let mut manifest_found = false;

    for part in &tree.parts {
        if part.disposition_filename.is_none() && part.name_param.is_none() {
            continue;
        }

        let is_data_file = part.subtype == DATA_FILE_SUBTYPE;

        let mut is_carrier_manifest = false;
        if !manifest_found && part.subtype == SPREADSHEET_SUBTYPE {
            let name = part
                .disposition_filename
                .as_deref()
                .or(part.name_param.as_deref());
            if let Some(name) = name
                && name.to_lowercase().contains(CARRIER_MANIFEST_MARKER)
            {
                is_carrier_manifest = true;
                manifest_found = true;
            }
        }

        attachments.push(Attachment {
            index: part.index,
            name: part
                .name_param
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| part.disposition_filename.clone()),
            data: part.data.clone(),
            is_data_file,
            is_carrier_manifest,
            companion_raw: is_data_file.then(|| raw_message.to_vec()),
        });
    }

    attachments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MimePart;

    fn part(
        index: usize,
        subtype: &str,
        filename: Option<&str>,
        name: Option<&str>,
        data: &[u8],
    ) -> MimePart {
        MimePart {
            index,
            subtype: subtype.to_string(),
            disposition_filename: filename.map(str::to_string),
            name_param: name.map(str::to_string),
            data: data.to_vec(),
        }
    }

    #[test]
    fn parts_without_filename_are_not_attachments() {
        let tree = MimeTree {
            parts: vec![part(0, "plain", None, None, b"body text")],
        };
        assert!(classify_parts(&tree, b"raw").is_empty());
    }

    #[test]
    fn octet_stream_is_data_file_with_companion() {
        let tree = MimeTree {
            parts: vec![part(
                0,
                "octet-stream",
                Some("in2024.dat"),
                None,
                b"A;B;C",
            )],
        };
        let atts = classify_parts(&tree, b"raw message bytes");
        assert_eq!(atts.len(), 1);
        assert!(atts[0].is_data_file);
        assert_eq!(
            atts[0].companion_raw.as_deref(),
            Some(b"raw message bytes".as_slice())
        );
    }

    #[test]
    fn ordinary_document_has_no_companion() {
        let tree = MimeTree {
            parts: vec![part(0, "pdf", Some("invoice.pdf"), None, b"%PDF")],
        };
        let atts = classify_parts(&tree, b"raw");
        assert!(!atts[0].is_data_file);
        assert!(atts[0].companion_raw.is_none());
    }

    #[test]
    fn spreadsheet_with_marker_is_carrier_manifest() {
        let tree = MimeTree {
            parts: vec![part(
                0,
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                Some("Транспортная заявка №7.xlsx"),
                None,
                b"PK",
            )],
        };
        let atts = classify_parts(&tree, b"raw");
        assert!(atts[0].is_carrier_manifest);
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let tree = MimeTree {
            parts: vec![part(
                0,
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                Some("ТРАНСПОРТНАЯ ЗАЯВКА.xlsx"),
                None,
                b"PK",
            )],
        };
        assert!(classify_parts(&tree, b"raw")[0].is_carrier_manifest);
    }

    #[test]
    fn spreadsheet_without_marker_is_plain_attachment() {
        let tree = MimeTree {
            parts: vec![part(
                0,
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                Some("Остатки.xlsx"),
                None,
                b"PK",
            )],
        };
        assert!(!classify_parts(&tree, b"raw")[0].is_carrier_manifest);
    }

    #[test]
    fn only_first_manifest_is_flagged() {
        let manifest = |i| {
            part(
                i,
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                Some("Транспортная заявка.xlsx"),
                None,
                b"PK",
            )
        };
        let tree = MimeTree {
            parts: vec![manifest(0), manifest(1)],
        };
        let atts = classify_parts(&tree, b"raw");
        assert!(atts[0].is_carrier_manifest);
        assert!(!atts[1].is_carrier_manifest);
    }

    #[test]
    fn name_param_wins_for_archive_name() {
        let tree = MimeTree {
            parts: vec![part(
                0,
                "octet-stream",
                Some("disposition.dat"),
                Some("name.dat"),
                b"x",
            )],
        };
        assert_eq!(classify_parts(&tree, b"raw")[0].name.as_deref(), Some("name.dat"));
    }
}
