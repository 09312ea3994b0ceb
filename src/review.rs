use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::api::{require_identifier, InvoiceApi};
use crate::error::{Result, ValidationError};
use crate::types::{
    ExtractedFields, InvoiceField, LineItem, LineItemColumn, ReconciliationResult,
};

/// What the user sees after pressing save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Success(String),
    Failure(String),
}

/// Editable copy of the extracted fields. Seeded once; afterwards the user's
/// edits are the source of truth until saved.
#[derive(Debug, Default)]
pub struct ReviewPanel {
    server: Option<ExtractedFields>,
    edited: Option<ExtractedFields>,
    invoice_id: Option<String>,
}

impl ReviewPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a fetched snapshot. Only the first snapshot with fields seeds the
    /// editable copy; later ones refresh the server copy and leave edits alone.
    pub fn load(&mut self, result: &ReconciliationResult) {
        if self.invoice_id.is_none() {
            self.invoice_id = result.invoice_id.clone();
        }
        let Some(fields) = &result.extracted_fields else {
            return;
        };
        self.server = Some(fields.clone());
        if self.edited.is_none() {
            info!(task_id = %result.job_id, "review panel seeded");
            self.edited = Some(fields.clone());
        }
    }

    /// Panel seeded from fields edited elsewhere, e.g. a JSON file.
    pub fn with_fields(invoice_id: &str, fields: ExtractedFields) -> Self {
        Self {
            server: None,
            edited: Some(fields),
            invoice_id: Some(invoice_id.to_string()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.edited.is_some()
    }

    pub fn fields(&self) -> Option<&ExtractedFields> {
        self.edited.as_ref()
    }

    pub fn invoice_id(&self) -> Option<&str> {
        self.invoice_id.as_deref()
    }

    pub fn set_invoice_id(&mut self, invoice_id: Option<String>) {
        if let Some(id) = invoice_id.filter(|s| !s.trim().is_empty()) {
            self.invoice_id = Some(id);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.edited.is_some() && self.edited != self.server
    }

    fn edited_mut(&mut self) -> Result<&mut ExtractedFields> {
        self.edited
            .as_mut()
            .ok_or_else(|| ValidationError::MissingIdentifier("extracted data").into())
    }

    pub fn set_field(&mut self, field: InvoiceField, value: &str) -> Result<()> {
        *self.edited_mut()?.get_mut(field) = value.to_string();
        Ok(())
    }

    pub fn set_line_item(
        &mut self,
        index: usize,
        column: LineItemColumn,
        value: &str,
    ) -> Result<()> {
        let item = self
            .edited_mut()?
            .line_items
            .get_mut(index)
            .ok_or(ValidationError::NoSuchLineItem(index + 1))?;
        *item.get_mut(column) = value.to_string();
        Ok(())
    }

    /// Appends an empty row and returns its index.
    pub fn add_line_item(&mut self) -> Result<usize> {
        let items = &mut self.edited_mut()?.line_items;
        items.push(LineItem::default());
        Ok(items.len() - 1)
    }

    pub fn remove_line_item(&mut self, index: usize) -> Result<LineItem> {
        let items = &mut self.edited_mut()?.line_items;
        if index >= items.len() {
            return Err(ValidationError::NoSuchLineItem(index + 1).into());
        }
        Ok(items.remove(index))
    }

    /// Drop edits and go back to what the server sent.
    pub fn revert(&mut self) {
        if self.server.is_some() {
            self.edited = self.server.clone();
        }
    }

    /// Hints shown beside the form. They never block a save.
    pub fn warnings(&self) -> Vec<String> {
        let Some(fields) = &self.edited else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if !fields.email.is_empty() && !email_re().is_match(&fields.email) {
            out.push(format!("Emailing Address '{}' does not look like an email.", fields.email));
        }
        if !fields.invoice_amount.is_empty() && !amount_re().is_match(&fields.invoice_amount) {
            out.push(format!("Invoice Amount '{}' is not a number.", fields.invoice_amount));
        }
        for (i, item) in fields.line_items.iter().enumerate() {
            for (label, value) in [
                ("Quantity", &item.quantity),
                ("Unit Price", &item.unit_price),
                ("Amount", &item.amount),
            ] {
                if !value.is_empty() && !amount_re().is_match(value) {
                    out.push(format!("Service {}: {} '{}' is not a number.", i + 1, label, value));
                }
            }
        }
        out
    }

    /// Post the full edited record. A missing invoice id is rejected here,
    /// before any request; server failures come back as a failure dialog.
    pub fn save(&mut self, api: &dyn InvoiceApi) -> Result<Dialog> {
        let invoice_id = require_identifier(self.invoice_id.as_deref(), "invoice id")?.to_string();
        let edited = self
            .edited
            .clone()
            .ok_or(ValidationError::MissingIdentifier("extracted data"))?;

        match api.save_invoice_data(&invoice_id, &edited) {
            Ok(resp) if resp.success => {
                info!(%invoice_id, "invoice saved");
                self.server = Some(edited);
                let message = if resp.message.is_empty() {
                    "Invoice saved.".to_string()
                } else {
                    resp.message
                };
                Ok(Dialog::Success(message))
            }
            Ok(resp) => {
                warn!(%invoice_id, message = %resp.message, "save rejected");
                Ok(Dialog::Failure(if resp.message.is_empty() {
                    "Save failed.".to_string()
                } else {
                    resp.message
                }))
            }
            Err(e) => {
                warn!(%invoice_id, "save failed: {}", e);
                Ok(Dialog::Failure(e.to_string()))
            }
        }
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

/// Plain or thousands-separated amounts with an optional currency sign.
fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[$€£]?\s*-?\d[\d,]*(\.\d+)?$").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::error::AppError;
    use crate::types::{JobStatus, SaveResponse};

    fn completed(bill_to: &str) -> ReconciliationResult {
        ReconciliationResult {
            job_id: "abc".to_string(),
            invoice_id: Some("inv-1".to_string()),
            status: JobStatus::Completed,
            extracted_fields: Some(ExtractedFields {
                bill_to: bill_to.to_string(),
                email: "ap@acme.test".to_string(),
                invoice_amount: "1,250.00".to_string(),
                line_items: vec![LineItem {
                    service: "Audit".to_string(),
                    quantity: "2".to_string(),
                    unit_price: "625".to_string(),
                    amount: "1250".to_string(),
                }],
                ..ExtractedFields::default()
            }),
            discrepancy_notes: None,
            error: None,
            raw_extracted: None,
        }
    }

    #[test]
    fn edits_survive_a_later_load() {
        let mut panel = ReviewPanel::new();
        panel.load(&completed("ACME"));
        panel.set_field(InvoiceField::BillTo, "ACME Holdings").unwrap();
        assert!(panel.is_dirty());

        panel.load(&completed("ACME"));
        assert_eq!(panel.fields().unwrap().bill_to, "ACME Holdings");
    }

    #[test]
    fn editing_before_load_is_rejected() {
        let mut panel = ReviewPanel::new();
        assert!(panel.set_field(InvoiceField::Email, "x").is_err());
        assert!(!panel.is_dirty());
    }

    #[test]
    fn line_items_can_be_edited_added_and_removed() {
        let mut panel = ReviewPanel::new();
        panel.load(&completed("ACME"));
        panel.set_line_item(0, LineItemColumn::Quantity, "3").unwrap();
        let idx = panel.add_line_item().unwrap();
        assert_eq!(idx, 1);
        panel.set_line_item(1, LineItemColumn::Service, "Travel").unwrap();
        assert!(matches!(
            panel.set_line_item(5, LineItemColumn::Amount, "1"),
            Err(AppError::Validation(ValidationError::NoSuchLineItem(6)))
        ));
        let removed = panel.remove_line_item(0).unwrap();
        assert_eq!(removed.quantity, "3");
        assert_eq!(panel.fields().unwrap().line_items[0].service, "Travel");

        panel.revert();
        assert!(!panel.is_dirty());
    }

    #[test]
    fn warnings_flag_bad_email_and_amounts() {
        let mut panel = ReviewPanel::new();
        panel.load(&completed("ACME"));
        assert!(panel.warnings().is_empty());
        panel.set_field(InvoiceField::Email, "not-an-email").unwrap();
        panel.set_line_item(0, LineItemColumn::UnitPrice, "six").unwrap();
        let warnings = panel.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].starts_with("Service 1: Unit Price"));
    }

    #[test]
    fn save_without_invoice_id_never_calls_api() {
        let api = FakeApi::default();
        let mut panel = ReviewPanel::new();
        let mut result = completed("ACME");
        result.invoice_id = None;
        panel.load(&result);

        let err = panel.save(&api).unwrap_err();
        assert_eq!(err.to_string(), "Missing invoice id.");
        assert_eq!(api.network_calls(), 0);
    }

    #[test]
    fn save_posts_edited_record_and_reports_dialogs() {
        let api = FakeApi::default();
        api.save_responses.borrow_mut().push_back(Ok(SaveResponse {
            success: true,
            message: "Invoice and report saved successfully".to_string(),
        }));
        api.save_responses
            .borrow_mut()
            .push_back(Err(AppError::transport(Some(400), "Missing required data")));

        let mut panel = ReviewPanel::new();
        panel.load(&completed("ACME"));
        panel.set_field(InvoiceField::InvoiceNumber, "INV-9").unwrap();

        let dialog = panel.save(&api).unwrap();
        assert_eq!(
            dialog,
            Dialog::Success("Invoice and report saved successfully".to_string())
        );
        assert!(!panel.is_dirty());
        {
            let saves = api.saves.borrow();
            assert_eq!(saves[0].0, "inv-1");
            assert_eq!(saves[0].1.invoice_number, "INV-9");
        }

        let dialog = panel.save(&api).unwrap();
        assert_eq!(
            dialog,
            Dialog::Failure("Request failed (400): Missing required data".to_string())
        );
    }
}
