use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Backend job status. Parsed case-insensitively; the backend emits upper case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown(raw.to_string()),
        }
    }

    /// Queued and processing jobs are still worth polling.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Processing => f.write_str("processing"),
            JobStatus::Completed => f.write_str("completed"),
            JobStatus::Failed => f.write_str("failed"),
            JobStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// How the user handed us the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    Dropped,
    Picked,
}

/// A file that passed client-side validation and may be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime: &'static str,
    pub size: u64,
    pub source: FileSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub file_reference: String,
    pub job_id: String,
    pub invoice_id: Option<String>,
    pub created_status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// One row of the services table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Unit Price")]
    pub unit_price: String,
    #[serde(rename = "Amount")]
    pub amount: String,
}

/// Invoice fields as extracted by the backend. Serialized with the display
/// keys the save endpoint expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(rename = "Bill To")]
    pub bill_to: String,
    #[serde(rename = "Emailing Address")]
    pub email: String,
    #[serde(rename = "Invoice Number")]
    pub invoice_number: String,
    #[serde(rename = "Invoice Date")]
    pub invoice_date: String,
    #[serde(rename = "Invoice Amount")]
    pub invoice_amount: String,
    #[serde(rename = "Services", default)]
    pub line_items: Vec<LineItem>,
}

/// Editable header fields, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    BillTo,
    Email,
    InvoiceNumber,
    InvoiceDate,
    InvoiceAmount,
}

impl InvoiceField {
    pub const ALL: [InvoiceField; 5] = [
        InvoiceField::BillTo,
        InvoiceField::Email,
        InvoiceField::InvoiceNumber,
        InvoiceField::InvoiceDate,
        InvoiceField::InvoiceAmount,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InvoiceField::BillTo => "Bill To",
            InvoiceField::Email => "Emailing Address",
            InvoiceField::InvoiceNumber => "Invoice Number",
            InvoiceField::InvoiceDate => "Invoice Date",
            InvoiceField::InvoiceAmount => "Invoice Amount",
        }
    }

    /// Accepts the snake_case wire key or a short alias typed at the prompt.
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "bill_to" | "billto" => Some(InvoiceField::BillTo),
            "email" | "emailing_address" => Some(InvoiceField::Email),
            "invoice_number" | "number" => Some(InvoiceField::InvoiceNumber),
            "invoice_date" | "date" => Some(InvoiceField::InvoiceDate),
            "invoice_amount" | "amount" => Some(InvoiceField::InvoiceAmount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItemColumn {
    Service,
    Quantity,
    UnitPrice,
    Amount,
}

impl LineItemColumn {
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "service" => Some(LineItemColumn::Service),
            "quantity" | "qty" => Some(LineItemColumn::Quantity),
            "unit_price" | "price" => Some(LineItemColumn::UnitPrice),
            "amount" => Some(LineItemColumn::Amount),
            _ => None,
        }
    }
}

impl ExtractedFields {
    pub fn get(&self, field: InvoiceField) -> &str {
        match field {
            InvoiceField::BillTo => &self.bill_to,
            InvoiceField::Email => &self.email,
            InvoiceField::InvoiceNumber => &self.invoice_number,
            InvoiceField::InvoiceDate => &self.invoice_date,
            InvoiceField::InvoiceAmount => &self.invoice_amount,
        }
    }

    pub fn get_mut(&mut self, field: InvoiceField) -> &mut String {
        match field {
            InvoiceField::BillTo => &mut self.bill_to,
            InvoiceField::Email => &mut self.email,
            InvoiceField::InvoiceNumber => &mut self.invoice_number,
            InvoiceField::InvoiceDate => &mut self.invoice_date,
            InvoiceField::InvoiceAmount => &mut self.invoice_amount,
        }
    }

    /// Decode the backend's `extracted_data` value. It arrives as an object, as a
    /// JSON-encoded string, or wrapped one level deep under its own `extracted_data` key.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let owned;
        let mut obj = match value {
            Value::String(s) => {
                owned = serde_json::from_str::<Value>(s)
                    .map_err(|e| AppError::Parse(format!("extracted_data is not JSON: {}", e)))?;
                &owned
            }
            other => other,
        };
        if let Some(inner) = obj.get("extracted_data").filter(|v| v.is_object()) {
            obj = inner;
        }
        let map = obj
            .as_object()
            .ok_or_else(|| AppError::Parse("extracted_data is not an object".to_string()))?;

        let text = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| map.get(*k).map(value_to_text))
                .unwrap_or_default()
        };

        let line_items = match map.get("services").or_else(|| map.get("line_items")) {
            Some(Value::Array(items)) => items.iter().map(LineItem::from_wire).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(AppError::Parse("services is not a list".to_string())),
        };

        Ok(ExtractedFields {
            bill_to: text(&["bill_to"]),
            email: text(&["emailing_address", "email"]),
            invoice_number: text(&["invoice_number"]),
            invoice_date: text(&["invoice_date"]),
            invoice_amount: text(&["invoice_amount"]),
            line_items,
        })
    }
}

impl LineItem {
    fn from_wire(value: &Value) -> Self {
        let text = |key: &str| value.get(key).map(value_to_text).unwrap_or_default();
        LineItem {
            service: text("service"),
            quantity: text("quantity"),
            unit_price: text("unit_price"),
            amount: text("amount"),
        }
    }

    pub fn get_mut(&mut self, column: LineItemColumn) -> &mut String {
        match column {
            LineItemColumn::Service => &mut self.service,
            LineItemColumn::Quantity => &mut self.quantity,
            LineItemColumn::UnitPrice => &mut self.unit_price,
            LineItemColumn::Amount => &mut self.amount,
        }
    }
}

/// Strings pass through trimmed, numbers and bools are stringified, null is empty.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Backend metadata about extraction confidence and analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscrepancyNotes {
    pub source_type: Option<String>,
    pub ocr_confidence: Option<String>,
    pub analysis: Option<String>,
}

impl DiscrepancyNotes {
    pub fn from_wire(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let text = |key: &str| {
            map.get(key)
                .filter(|v| !v.is_null())
                .map(value_to_text)
                .filter(|s| !s.is_empty())
        };
        let analysis = map.get("analysis_result").and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => serde_json::to_string_pretty(other).ok(),
        });
        Some(DiscrepancyNotes {
            source_type: text("source_type"),
            ocr_confidence: text("ocr_confidence"),
            analysis,
        })
    }

    pub fn is_high_confidence(&self) -> bool {
        self.ocr_confidence
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case("high"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultsWire {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub extracted_data: Option<Value>,
    #[serde(default)]
    pub discrepancies: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Snapshot of one poll. Each fetch replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub job_id: String,
    pub invoice_id: Option<String>,
    pub status: JobStatus,
    pub extracted_fields: Option<ExtractedFields>,
    pub discrepancy_notes: Option<DiscrepancyNotes>,
    pub error: Option<String>,
    pub raw_extracted: Option<Value>,
}

impl ReconciliationResult {
    pub(crate) fn from_wire(job_id: &str, wire: ResultsWire) -> Result<Self> {
        let status = JobStatus::parse(&wire.status);
        let extracted_fields = match &wire.extracted_data {
            Some(v) if !v.is_null() && status == JobStatus::Completed => {
                Some(ExtractedFields::from_wire(v)?)
            }
            _ => None,
        };
        let raw_extracted = wire.extracted_data.filter(|v| !v.is_null()).map(|v| match v {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        });
        Ok(ReconciliationResult {
            job_id: job_id.to_string(),
            invoice_id: wire.invoice_id.filter(|s| !s.trim().is_empty()),
            status,
            extracted_fields,
            discrepancy_notes: wire.discrepancies.as_ref().and_then(DiscrepancyNotes::from_wire),
            error: wire.error,
            raw_extracted,
        })
    }
}

/// Payload for the save endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SaveRequest<'a> {
    pub invoice_id: &'a str,
    pub edited_data: &'a ExtractedFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_backend_upper_case() {
        assert_eq!(JobStatus::parse("COMPLETED"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("Processing"), JobStatus::Processing);
        assert_eq!(JobStatus::parse("queued"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("weird"), JobStatus::Unknown("weird".to_string()));
        assert!(JobStatus::Queued.is_pending());
        assert!(!JobStatus::Failed.is_pending());
    }

    #[test]
    fn extracted_fields_unwrap_nested_payload() {
        let wire = json!({
            "extracted_data": {
                "bill_to": "ACME Corp",
                "emailing_address": "ap@acme.test",
                "invoice_number": "INV-7",
                "invoice_date": "2024-03-01",
                "invoice_amount": 1250.5,
                "services": [
                    {"service": "Audit", "quantity": 2, "unit_price": "500", "amount": "1000"}
                ]
            }
        });
        let fields = ExtractedFields::from_wire(&wire).unwrap();
        assert_eq!(fields.bill_to, "ACME Corp");
        assert_eq!(fields.email, "ap@acme.test");
        assert_eq!(fields.invoice_amount, "1250.5");
        assert_eq!(fields.line_items.len(), 1);
        assert_eq!(fields.line_items[0].quantity, "2");
    }

    #[test]
    fn extracted_fields_accept_json_string() {
        let wire = Value::String(r#"{"bill_to":"Beta","line_items":[]}"#.to_string());
        let fields = ExtractedFields::from_wire(&wire).unwrap();
        assert_eq!(fields.bill_to, "Beta");
        assert!(fields.line_items.is_empty());
    }

    #[test]
    fn extracted_fields_reject_non_object() {
        let err = ExtractedFields::from_wire(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        let err = ExtractedFields::from_wire(&Value::String("not json".into())).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn save_body_uses_display_keys() {
        let fields = ExtractedFields {
            bill_to: "ACME".into(),
            line_items: vec![LineItem {
                service: "Audit".into(),
                unit_price: "10".into(),
                ..LineItem::default()
            }],
            ..ExtractedFields::default()
        };
        let body = serde_json::to_value(SaveRequest {
            invoice_id: "inv-1",
            edited_data: &fields,
        })
        .unwrap();
        assert_eq!(body["invoice_id"], "inv-1");
        assert_eq!(body["edited_data"]["Bill To"], "ACME");
        assert_eq!(body["edited_data"]["Services"][0]["Unit Price"], "10");
    }

    #[test]
    fn discrepancies_keep_structured_analysis_readable() {
        let notes = DiscrepancyNotes::from_wire(&json!({
            "source_type": "image",
            "ocr_confidence": "high",
            "analysis_result": {"mismatch": false}
        }))
        .unwrap();
        assert_eq!(notes.source_type.as_deref(), Some("image"));
        assert!(notes.is_high_confidence());
        assert!(notes.analysis.unwrap().contains("\"mismatch\": false"));
    }

    #[test]
    fn results_only_decode_fields_once_completed() {
        let wire: ResultsWire = serde_json::from_value(json!({
            "status": "PROCESSING",
            "task_id": "abc"
        }))
        .unwrap();
        let result = ReconciliationResult::from_wire("abc", wire).unwrap();
        assert_eq!(result.status, JobStatus::Processing);
        assert!(result.extracted_fields.is_none());
    }
}
