use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AppError, Result};
use crate::types::{ExtractedFields, InvoiceField};

const INVOICE_HEADERS: &[&str] = &[
    "Invoice Number",
    "Invoice Date",
    "Bill To",
    "Emailing Address",
    "Invoice Amount",
];

const SERVICE_HEADERS: &[&str] = &["Invoice Number", "Service", "Quantity", "Unit Price", "Amount"];

/// Remove characters that corrupt the sheet XML. Keeps tab, newline, CR.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t'
                || c == '\n'
                || c == '\r'
                || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

/// "1,250.00", "$ 99" and "1 000" all parse; anything else stays text.
fn parse_amount(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '$' | '€' | '£'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn write_text(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> std::result::Result<(), XlsxError> {
    worksheet
        .write_string_with_format(row, col, sanitize_cell(text), format)
        .map(|_| ())
}

/// Number cell when the value parses, sanitized text otherwise.
fn write_amount(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    number_format: &Format,
    text_format: &Format,
) -> std::result::Result<(), XlsxError> {
    match parse_amount(value) {
        Some(n) => worksheet.write_number_with_format(row, col, n, number_format).map(|_| ()),
        None => write_text(worksheet, row, col, value, text_format),
    }
}

/// Character count × 1.2, clamped to 10–50.
fn estimate_text_width(text: &str) -> f64 {
    (text.chars().count() as f64 * 1.2).clamp(10.0, 50.0)
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF))
}

fn write_headers(
    worksheet: &mut Worksheet,
    headers: &[&str],
    widths: &[f64],
) -> std::result::Result<(), XlsxError> {
    let format = header_format();
    for (col, header) in headers.iter().enumerate() {
        write_text(worksheet, 0, col as u16, header, &format)?;
        worksheet.set_column_width(col as u16, widths.get(col).copied().unwrap_or(12.0))?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn column_widths(headers: &[&str], rows: &[Vec<&str>]) -> Vec<f64> {
    let mut widths: Vec<f64> = headers.iter().map(|h| estimate_text_width(h)).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = w.max(estimate_text_width(cell));
        }
    }
    widths
}

/// Downloads (else Desktop), `Invoices_<timestamp>.xlsx`, numbered if taken.
fn default_export_path() -> Result<PathBuf> {
    let dir = dirs::download_dir().or_else(dirs::desktop_dir).ok_or_else(|| {
        AppError::Export("Could not find Downloads or Desktop folder.".to_string())
    })?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut path = dir.join(format!("Invoices_{}.xlsx", stamp));
    let mut counter = 2u32;
    while path.exists() {
        path = dir.join(format!("Invoices_{}_{}.xlsx", stamp, counter));
        counter += 1;
    }
    Ok(path)
}

fn resolve_path(path_override: Option<&Path>) -> Result<PathBuf> {
    match path_override {
        Some(p) if !p.as_os_str().is_empty() => {
            let mut pb = p.to_path_buf();
            if pb.extension().and_then(|e| e.to_str()) != Some("xlsx") {
                pb.set_extension("xlsx");
            }
            Ok(pb)
        }
        _ => default_export_path(),
    }
}

/// Write reviewed invoices to a new workbook: one "Invoices" row per invoice and a
/// "Services" sheet with every line item. Returns the written path.
pub fn export_invoices_to_excel(
    invoices: &[ExtractedFields],
    path_override: Option<&Path>,
) -> Result<PathBuf> {
    if invoices.is_empty() {
        return Err(AppError::Export("Nothing to export yet.".to_string()));
    }
    let path = resolve_path(path_override)?;

    let text_format = Format::new().set_text_wrap();
    let amount_format = Format::new()
        .set_num_format("#,##0.00")
        .set_align(FormatAlign::Right);

    let mut workbook = Workbook::new();

    let invoice_rows: Vec<Vec<&str>> = invoices
        .iter()
        .map(|inv| {
            vec![
                inv.get(InvoiceField::InvoiceNumber),
                inv.get(InvoiceField::InvoiceDate),
                inv.get(InvoiceField::BillTo),
                inv.get(InvoiceField::Email),
                inv.get(InvoiceField::InvoiceAmount),
            ]
        })
        .collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Invoices")?;
    let mut widths = column_widths(INVOICE_HEADERS, &invoice_rows);
    widths[4] = 14.0;
    write_headers(sheet, INVOICE_HEADERS, &widths)?;
    for (i, row) in invoice_rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, value) in row.iter().enumerate().take(4) {
            write_text(sheet, r, col as u16, value, &text_format)?;
        }
        write_amount(sheet, r, 4, row[4], &amount_format, &text_format)?;
    }

    let service_rows: Vec<Vec<&str>> = invoices
        .iter()
        .flat_map(|inv| {
            inv.line_items.iter().map(move |item| {
                vec![
                    inv.invoice_number.as_str(),
                    item.service.as_str(),
                    item.quantity.as_str(),
                    item.unit_price.as_str(),
                    item.amount.as_str(),
                ]
            })
        })
        .collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Services")?;
    let mut widths = column_widths(SERVICE_HEADERS, &service_rows);
    for w in widths.iter_mut().skip(2) {
        *w = 14.0;
    }
    write_headers(sheet, SERVICE_HEADERS, &widths)?;
    for (i, row) in service_rows.iter().enumerate() {
        let r = (i + 1) as u32;
        write_text(sheet, r, 0, row[0], &text_format)?;
        write_text(sheet, r, 1, row[1], &text_format)?;
        for col in 2..5 {
            write_amount(sheet, r, col as u16, row[col], &amount_format, &text_format)?;
        }
    }

    workbook.save(&path).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("being used") {
            AppError::Export("Please close the file in Excel first.".to_string())
        } else {
            AppError::Export(format!("Cannot write to file: {}", msg))
        }
    })?;
    info!(path = %path.display(), invoices = invoices.len(), "exported invoices");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineItem;
    use tempfile::TempDir;

    #[test]
    fn sanitize_drops_control_characters() {
        assert_eq!(sanitize_cell("a\u{0}b\tc\u{7f}"), "ab\tc");
    }

    #[test]
    fn amounts_parse_with_separators() {
        assert_eq!(parse_amount("1,250.50"), Some(1250.5));
        assert_eq!(parse_amount("$ 99"), Some(99.0));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn override_path_gets_xlsx_extension() {
        let p = resolve_path(Some(Path::new("/tmp/out"))).unwrap();
        assert_eq!(p, PathBuf::from("/tmp/out.xlsx"));
    }

    #[test]
    fn nothing_to_export() {
        assert!(matches!(
            export_invoices_to_excel(&[], None),
            Err(AppError::Export(_))
        ));
    }

    #[test]
    fn writes_workbook() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("review.xlsx");
        let invoice = ExtractedFields {
            invoice_number: "INV-7".into(),
            invoice_amount: "1,000.00".into(),
            line_items: vec![LineItem {
                service: "Audit".into(),
                quantity: "1".into(),
                unit_price: "1000".into(),
                amount: "1000".into(),
            }],
            ..ExtractedFields::default()
        };
        let written = export_invoices_to_excel(&[invoice], Some(&target)).unwrap();
        assert_eq!(written, target);
        assert!(std::fs::metadata(&written).unwrap().len() > 0);
    }
}
