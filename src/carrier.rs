//! Carrier resolution from a transport-request spreadsheet.
//!
//! The manifest is a legacy fixed-layout export: somewhere in the first
//! sheet sits a row whose first cell is «Заказчик» and whose sixth column
//! repeats the carrier header; the carrier name then lives a further three
//! columns right. The layout is isolated here so it can be swapped without
//! touching the pipeline.

use std::io::Write;

use calamine::{Data, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::error::CarrierError;

/// Header phrase marking the carrier column block.
const CARRIER_HEADER: &str = "Транспортная компания (ТК)";
/// First-cell literal of the row carrying the carrier name.
const CUSTOMER_HEADER: &str = "Заказчик";
/// Sentinel the exporter writes when no carrier was assigned.
const NO_DATA: &str = "#NULL!";
/// Column that must repeat the carrier header inside the matched row.
const HEADER_COLUMN: usize = 5;
/// Column holding the carrier name.
const CARRIER_COLUMN: usize = 8;

/// Parse a carrier manifest and return the carrier name, if any.
///
/// The bytes are staged in a scoped temp file that is removed on every
/// exit path. A well-formed but empty or headerless sheet is `Ok(None)`.
pub fn resolve_carrier(data: &[u8]) -> Result<Option<String>, CarrierError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("manifest_")
        .suffix(".xlsx")
        .tempfile()?;
    tmp.write_all(data)?;
    tmp.flush()?;

    let mut workbook: Xlsx<_> =
        open_workbook(tmp.path()).map_err(|e: calamine::XlsxError| CarrierError::Sheet(e.to_string()))?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(None);
    };
    let range = range.map_err(|e| CarrierError::Sheet(e.to_string()))?;

    let carrier = carrier_from_rows(range.rows());
    debug!(carrier = carrier.as_deref().unwrap_or("-"), "Manifest scanned");
    Ok(carrier)
}

/// Scan sheet rows for the carrier cell.
fn carrier_from_rows<'a>(rows: impl Iterator<Item = &'a [Data]>) -> Option<String> {
    for row in rows {
        if !row.iter().any(|cell| cell_text(cell) == Some(CARRIER_HEADER)) {
            continue;
        }
        let first = row.first().and_then(cell_text);
        let header = row.get(HEADER_COLUMN).and_then(cell_text);
        if first != Some(CUSTOMER_HEADER) || header != Some(CARRIER_HEADER) {
            continue;
        }
        return row
            .get(CARRIER_COLUMN)
            .and_then(cell_text)
            .filter(|name| *name != NO_DATA && !name.is_empty())
            .map(str::to_string);
    }
    None
}

fn cell_text(cell: &Data) -> Option<&str> {
    match cell {
        Data::String(s) => Some(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Data> {
        cells.iter().map(|c| Data::String(c.to_string())).collect()
    }

    fn scan(rows: &[Vec<Data>]) -> Option<String> {
        carrier_from_rows(rows.iter().map(Vec::as_slice))
    }

    fn carrier_row(carrier: &str) -> Vec<Data> {
        row(&[
            "Заказчик",
            "",
            "",
            "",
            "",
            "Транспортная компания (ТК)",
            "",
            "",
            carrier,
        ])
    }

    #[test]
    fn finds_carrier_in_matching_row() {
        let rows = vec![row(&["шапка", "документа"]), carrier_row("ООО Деловые Линии")];
        assert_eq!(scan(&rows), Some("ООО Деловые Линии".to_string()));
    }

    #[test]
    fn sentinel_normalizes_to_absent() {
        let rows = vec![carrier_row("#NULL!")];
        assert_eq!(scan(&rows), None);
    }

    #[test]
    fn empty_sheet_is_absent() {
        assert_eq!(scan(&[]), None);
    }

    #[test]
    fn header_in_wrong_position_is_ignored() {
        // The phrase is present, but not at the expected offsets.
        let rows = vec![row(&["Транспортная компания (ТК)", "ООО Перевозчик"])];
        assert_eq!(scan(&rows), None);
    }

    #[test]
    fn wrong_first_cell_is_ignored() {
        let rows = vec![row(&[
            "Получатель",
            "",
            "",
            "",
            "",
            "Транспортная компания (ТК)",
            "",
            "",
            "ООО Перевозчик",
        ])];
        assert_eq!(scan(&rows), None);
    }

    #[test]
    fn missing_carrier_column_is_absent() {
        let rows = vec![row(&[
            "Заказчик",
            "",
            "",
            "",
            "",
            "Транспортная компания (ТК)",
        ])];
        assert_eq!(scan(&rows), None);
    }
}
