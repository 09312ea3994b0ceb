//! Plain-text views for the results page and the review form.

use std::fmt::Write;

use crate::review::Dialog;
use crate::types::{DiscrepancyNotes, ExtractedFields, InvoiceField, ReconciliationResult};
use crate::upload::{UploadForm, UploadState};

const EMPTY: &str = "-";

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() {
        EMPTY
    } else {
        s
    }
}

pub fn busy(task_id: &str) -> String {
    format!(
        "Processing your invoice...\n  Task ID: {}\n  This may take a few moments",
        task_id
    )
}

pub fn error(message: &str) -> String {
    format!("Error loading results: {}", message)
}

pub fn dialog(dialog: &Dialog) -> String {
    match dialog {
        Dialog::Success(msg) => format!("[ Saved ] {}", msg),
        Dialog::Failure(msg) => format!("[ Save failed ] {}", msg),
    }
}

pub fn upload_form(form: &UploadForm) -> String {
    let mut out = String::from("Upload Invoice\n");
    let zone = match form.file() {
        Some(f) => format!("{} ({} bytes)", f.file_name, f.size),
        None if form.drag_active() => "Release to drop your invoice".to_string(),
        None => "Drag and drop your invoice here, or browse for a file".to_string(),
    };
    let _ = writeln!(out, "  [ {} ]", zone);
    if let Some(notice) = form.notice() {
        let _ = writeln!(out, "  ! {}", notice);
    }
    match form.state() {
        UploadState::Submitting => out.push_str("  Processing...\n"),
        UploadState::Error(msg) => {
            let _ = writeln!(out, "  ! {}", msg);
        }
        UploadState::Navigated(job) => {
            let _ = writeln!(out, "  Uploaded. Task ID: {}", job.job_id);
        }
        UploadState::Idle | UploadState::FileSelected => {}
    }
    let button = if form.can_submit() {
        "[Upload and Extract]"
    } else {
        "(Upload and Extract)"
    };
    let _ = writeln!(out, "  {}", button);
    out
}

/// Header fields, then the services table. Rows are numbered from 1 so the
/// user can address them when editing.
pub fn fields(fields: &ExtractedFields) -> String {
    let mut out = String::from("Extracted Information\n");
    let width = InvoiceField::ALL
        .iter()
        .map(|f| f.label().len())
        .max()
        .unwrap_or(0);
    for field in InvoiceField::ALL {
        let _ = writeln!(out, "  {:<width$}  {}", field.label(), or_dash(fields.get(field)));
    }

    out.push_str("\nServices\n");
    if fields.line_items.is_empty() {
        out.push_str("  No services data available\n");
        return out;
    }
    let header = ["#", "Service", "Quantity", "Unit Price", "Amount"];
    let rows: Vec<[String; 5]> = fields
        .line_items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            [
                (i + 1).to_string(),
                or_dash(&item.service).to_string(),
                or_dash(&item.quantity).to_string(),
                or_dash(&item.unit_price).to_string(),
                or_dash(&item.amount).to_string(),
            ]
        })
        .collect();
    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: &[&str]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect();
        format!("  {}", padded.join(" | ")).trim_end().to_string()
    };
    let _ = writeln!(out, "{}", line(&header[..]));
    let _ = writeln!(
        out,
        "  {}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        let _ = writeln!(out, "{}", line(&cells[..]));
    }
    out
}

pub fn processing_details(notes: Option<&DiscrepancyNotes>) -> String {
    let mut out = String::from("Processing Details\n");
    let Some(notes) = notes else {
        out.push_str("  Processing...\n");
        return out;
    };
    let _ = writeln!(out, "  Source Type     {}", notes.source_type.as_deref().unwrap_or(EMPTY));
    let confidence = notes
        .ocr_confidence
        .as_deref()
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| EMPTY.to_string());
    let marker = if notes.is_high_confidence() { "ok" } else { "check" };
    let _ = writeln!(out, "  OCR Confidence  {} ({})", confidence, marker);
    if let Some(analysis) = &notes.analysis {
        out.push_str("  Analysis Result\n");
        for line in analysis.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out
}

/// Completed job: fields on top, backend notes below.
pub fn result(result: &ReconciliationResult) -> String {
    let mut out = String::from("Invoice Analysis Results\n\n");
    match &result.extracted_fields {
        Some(f) => out.push_str(&fields(f)),
        None => {
            let _ = writeln!(out, "No results available yet\n  Task ID: {}", result.job_id);
        }
    }
    out.push('\n');
    out.push_str(&processing_details(result.discrepancy_notes.as_ref()));
    out
}

/// Pretty-printed `extracted_data` exactly as the backend sent it.
pub fn raw(result: &ReconciliationResult) -> String {
    match &result.raw_extracted {
        Some(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        None => "No OCR data available".to_string(),
    }
}

pub fn warnings(warnings: &[String]) -> String {
    warnings.iter().map(|w| format!("  ! {}\n", w)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, LineItem};

    fn sample() -> ExtractedFields {
        ExtractedFields {
            bill_to: "ACME".into(),
            invoice_number: "INV-7".into(),
            line_items: vec![LineItem {
                service: "Consulting".into(),
                quantity: "2".into(),
                unit_price: "".into(),
                amount: "200".into(),
            }],
            ..ExtractedFields::default()
        }
    }

    #[test]
    fn empty_values_render_as_dash() {
        let text = fields(&sample());
        assert!(text.contains("Bill To           ACME"));
        assert!(text.contains("Emailing Address  -"));
        assert!(text.contains("Consulting"));
        assert!(!text.contains("No services data available"));
    }

    #[test]
    fn no_services_message() {
        let text = fields(&ExtractedFields::default());
        assert!(text.contains("No services data available"));
    }

    #[test]
    fn details_upper_case_confidence() {
        let notes = DiscrepancyNotes {
            source_type: Some("image".into()),
            ocr_confidence: Some("low".into()),
            analysis: Some("line one\nline two".into()),
        };
        let text = processing_details(Some(&notes));
        assert!(text.contains("OCR Confidence  LOW (check)"));
        assert!(text.contains("    line two"));
        assert!(processing_details(None).contains("Processing..."));
    }

    #[test]
    fn raw_dump_without_data() {
        let result = ReconciliationResult {
            job_id: "abc".into(),
            invoice_id: None,
            status: JobStatus::Completed,
            extracted_fields: None,
            discrepancy_notes: None,
            error: None,
            raw_extracted: None,
        };
        assert_eq!(raw(&result), "No OCR data available");
        assert!(super::result(&result).contains("No results available yet"));
    }

    #[test]
    fn busy_view_shows_task() {
        assert!(busy("abc").contains("Task ID: abc"));
    }
}
