use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::time::Duration;

use invoice_reconciler_lib::api::InvoiceApi;
use invoice_reconciler_lib::error::{AppError, Result};
use invoice_reconciler_lib::poller::PollSettings;
use invoice_reconciler_lib::session::{Control, Session};
use invoice_reconciler_lib::shell::Route;
use invoice_reconciler_lib::types::{
    ExtractedFields, JobStatus, LineItem, ReconciliationResult, SaveResponse, SelectedFile,
    UploadResponse,
};
use tempfile::TempDir;

/// Scripted backend: one upload, a queue of result snapshots, recorded saves.
#[derive(Default)]
struct ScriptedBackend {
    uploads: RefCell<Vec<String>>,
    snapshots: RefCell<VecDeque<ReconciliationResult>>,
    result_calls: RefCell<u32>,
    saves: RefCell<Vec<(String, ExtractedFields)>>,
}

impl InvoiceApi for ScriptedBackend {
    fn upload_invoice(&self, file: &SelectedFile) -> Result<UploadResponse> {
        self.uploads.borrow_mut().push(file.file_name.clone());
        Ok(UploadResponse {
            success: true,
            task_id: "abc".into(),
            invoice_id: Some("inv-42".into()),
            message: "File uploaded".into(),
        })
    }

    fn get_results(&self, task_id: &str) -> Result<ReconciliationResult> {
        *self.result_calls.borrow_mut() += 1;
        let mut snapshots = self.snapshots.borrow_mut();
        let next = if snapshots.len() > 1 {
            snapshots.pop_front()
        } else {
            snapshots.front().cloned()
        };
        let mut result = next.ok_or_else(|| AppError::transport(Some(404), "Task not found"))?;
        result.job_id = task_id.to_string();
        Ok(result)
    }

    fn save_invoice_data(
        &self,
        invoice_id: &str,
        edited: &ExtractedFields,
    ) -> Result<SaveResponse> {
        self.saves
            .borrow_mut()
            .push((invoice_id.to_string(), edited.clone()));
        Ok(SaveResponse {
            success: true,
            message: "Invoice data saved successfully".into(),
        })
    }
}

fn snapshot(status: JobStatus, fields: Option<ExtractedFields>) -> ReconciliationResult {
    ReconciliationResult {
        job_id: String::new(),
        invoice_id: Some("inv-42".into()),
        status,
        extracted_fields: fields,
        discrepancy_notes: None,
        error: None,
        raw_extracted: None,
    }
}

fn extracted() -> ExtractedFields {
    ExtractedFields {
        bill_to: "ACME Corp".into(),
        email: "billing@acme.test".into(),
        invoice_number: "INV-001".into(),
        invoice_date: "2024-01-31".into(),
        invoice_amount: "1,200.00".into(),
        line_items: vec![LineItem {
            service: "Consulting".into(),
            quantity: "2".into(),
            unit_price: "600".into(),
            amount: "1200".into(),
        }],
    }
}

fn instant() -> PollSettings {
    PollSettings {
        interval: Duration::ZERO,
        max_attempts: 10,
    }
}

fn send(session: &mut Session<ScriptedBackend>, line: &str) -> String {
    let mut out = Vec::new();
    let control = session.dispatch(line, &mut out).unwrap();
    assert_eq!(control, Control::Continue);
    String::from_utf8(out).unwrap()
}

#[test]
fn upload_poll_edit_save() {
    let dir = TempDir::new().unwrap();
    let invoice = dir.path().join("invoice.pdf");
    fs::write(&invoice, b"%PDF-1.7\nfake body").unwrap();

    let backend = ScriptedBackend::default();
    {
        let mut snapshots = backend.snapshots.borrow_mut();
        snapshots.push_back(snapshot(JobStatus::Processing, None));
        snapshots.push_back(snapshot(JobStatus::Processing, None));
        snapshots.push_back(snapshot(JobStatus::Completed, Some(extracted())));
    }
    let mut session = Session::new(backend, instant());

    send(&mut session, &format!("pick {}", invoice.display()));
    let page = send(&mut session, "upload");
    assert_eq!(session.route(), &Route::Results("abc".into()));
    assert!(page.contains("ACME Corp"), "{page}");
    assert_eq!(*session.api().result_calls.borrow(), 3);
    assert_eq!(session.api().uploads.borrow().as_slice(), ["invoice.pdf"]);

    send(&mut session, "set bill_to ACME Corporation");
    send(&mut session, "item 1 amount 1250");
    assert!(session.review().is_dirty());

    let page = send(&mut session, "save");
    assert!(page.contains("Invoice data saved successfully"), "{page}");
    let saves = session.api().saves.borrow();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].0, "inv-42");
    assert_eq!(saves[0].1.bill_to, "ACME Corporation");
    assert_eq!(saves[0].1.line_items[0].amount, "1250");
    assert_eq!(saves[0].1.invoice_number, "INV-001");
}

#[test]
fn invalid_file_never_reaches_backend() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("notes.docx");
    fs::write(&bogus, b"not allowed").unwrap();

    let mut session = Session::new(ScriptedBackend::default(), instant());
    let page = send(&mut session, &format!("drop {}", bogus.display()));
    assert!(page.contains("File type not supported"), "{page}");
    send(&mut session, "upload");

    assert!(session.api().uploads.borrow().is_empty());
    assert_eq!(*session.api().result_calls.borrow(), 0);
}

#[test]
fn saving_without_a_job_is_rejected_locally() {
    let mut session = Session::new(ScriptedBackend::default(), instant());
    let page = send(&mut session, "save");
    assert!(page.contains("Missing"), "{page}");
    assert!(session.api().saves.borrow().is_empty());
}

#[test]
fn failed_job_stops_polling() {
    let backend = ScriptedBackend::default();
    let mut failed = snapshot(JobStatus::Failed, None);
    failed.error = Some("OCR engine crashed".into());
    backend.snapshots.borrow_mut().push_back(failed);
    let mut session = Session::new(backend, instant());

    let page = send(&mut session, "results abc");
    assert!(page.contains("OCR engine crashed"), "{page}");
    assert_eq!(*session.api().result_calls.borrow(), 1);
    assert!(!session.review().is_loaded());
}
