//! Document rules — order direction, legacy decoding and date extraction.
//!
//! Data files arrive in a fixed-width legacy record format, windows-1251
//! encoded, with `;`-separated leading fields. The fragile positional
//! parsing is kept behind the narrow functions below.

use encoding_rs::WINDOWS_1251;

/// Filename prefix of outbound documents.
const OUTBOUND_PREFIX: &str = "out";
/// Outbound variant used by one partner's internet-shop exports.
const OUTBOUND_SHOP_PREFIX: &str = "inM";
/// Filename prefix of inbound documents.
const INBOUND_PREFIX: &str = "in";
/// Field separator of the legacy record format.
const FIELD_SEPARATOR: char = ';';
/// Length of the date field that follows the third separator.
const DATE_LEN: usize = 10;

/// Direction of a warehouse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Inbound,
    Outbound,
}

impl OrderDirection {
    /// WMS order type submitted on create.
    pub fn order_type(&self) -> &'static str {
        match self {
            OrderDirection::Inbound => "Прием на хранение от поклажедателя",
            OrderDirection::Outbound => "Отгрузка поклажедателю",
        }
    }

    /// Storage path segment for order files.
    pub fn slug(&self) -> &'static str {
        match self {
            OrderDirection::Inbound => "incoming",
            OrderDirection::Outbound => "outcoming",
        }
    }

    /// Genitive label used in partner-facing error mail.
    pub fn error_label(&self) -> &'static str {
        match self {
            OrderDirection::Inbound => "поступления",
            OrderDirection::Outbound => "отправления",
        }
    }
}

/// Decide order direction from the archived filename.
///
/// Anything outside the known prefixes implies no order, which is not an
/// error.
pub fn direction_for(filename: &str) -> Option<OrderDirection> {
    if filename.starts_with(OUTBOUND_PREFIX) || filename.starts_with(OUTBOUND_SHOP_PREFIX) {
        Some(OrderDirection::Outbound)
    } else if filename.starts_with(INBOUND_PREFIX) {
        Some(OrderDirection::Inbound)
    } else {
        None
    }
}

/// Decode a legacy windows-1251 export to UTF-8.
///
/// Undecodable sequences are replaced, never fatal.
pub fn decode_legacy(data: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1251.decode(data);
    text.into_owned()
}

/// Extract the document date: the [`DATE_LEN`] characters following the
/// third field separator. Fewer than three separators means the record
/// carries no date and no order should be created.
pub fn document_date(text: &str) -> Option<String> {
    let (pos, _) = text
        .char_indices()
        .filter(|(_, c)| *c == FIELD_SEPARATOR)
        .nth(2)?;
    let start = pos + FIELD_SEPARATOR.len_utf8();
    Some(text[start..].chars().take(DATE_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── direction ───────────────────────────────────────────────────

    #[test]
    fn out_prefix_is_outbound() {
        assert_eq!(direction_for("out2024.dat"), Some(OrderDirection::Outbound));
    }

    #[test]
    fn shop_variant_prefix_is_outbound() {
        assert_eq!(direction_for("inM555.dat"), Some(OrderDirection::Outbound));
    }

    #[test]
    fn in_prefix_is_inbound() {
        assert_eq!(direction_for("in2024.dat"), Some(OrderDirection::Inbound));
    }

    #[test]
    fn unknown_prefix_implies_no_order() {
        assert_eq!(direction_for("report2024.dat"), None);
        assert_eq!(direction_for(""), None);
    }

    // ── legacy decoding ─────────────────────────────────────────────

    #[test]
    fn decode_windows_1251_cyrillic() {
        // «Элика» in windows-1251.
        let bytes = [0xDD, 0xEB, 0xE8, 0xEA, 0xE0];
        assert_eq!(decode_legacy(&bytes), "Элика");
    }

    #[test]
    fn decode_never_fails_on_garbage() {
        let text = decode_legacy(&[0x41, 0x98, 0x42]);
        assert!(text.starts_with('A'));
        assert!(text.ends_with('B'));
    }

    // ── document date ───────────────────────────────────────────────

    #[test]
    fn date_follows_third_separator() {
        assert_eq!(
            document_date("N123;40;2;2024-05-01;10:30:00"),
            Some("2024-05-01".to_string())
        );
    }

    #[test]
    fn fewer_than_three_separators_yields_none() {
        assert_eq!(document_date("N123;40;2024-05-01"), None);
        assert_eq!(document_date("no separators at all"), None);
    }

    #[test]
    fn date_extraction_counts_characters_not_bytes() {
        assert_eq!(
            document_date("код;тип;склад;2024-05-01;прочее"),
            Some("2024-05-01".to_string())
        );
    }

    #[test]
    fn short_tail_returns_what_is_there() {
        assert_eq!(document_date("a;b;c;2024"), Some("2024".to_string()));
    }
}
