use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::api::{require_identifier, InvoiceApi};
use crate::error::{AppError, Result, ValidationError};
use crate::types::{FileSource, JobStatus, SelectedFile, UploadJob};

pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Extension → MIME type for the files the backend accepts.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
];

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report-style check used by the `validate` command.
pub fn validate_invoice_file(path: &Path) -> ValidationResult {
    match inspect_file(path, FileSource::Picked) {
        Ok(_) => ValidationResult {
            valid: true,
            error: None,
        },
        Err(e) => ValidationResult {
            valid: false,
            error: Some(e.to_string()),
        },
    }
}

/// Type, size and (for PDFs) header check. Never touches the network.
pub fn inspect_file(path: &Path, source: FileSource) -> Result<SelectedFile> {
    if !path.is_file() {
        return Err(ValidationError::FileNotFound.into());
    }
    let mime = mime_for_path(path).ok_or(ValidationError::UnsupportedFileType)?;
    let size = fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::FileTooLarge.into());
    }
    if mime == "application/pdf" {
        let mut header = [0u8; 5];
        let mut f = fs::File::open(path)?;
        if f.read_exact(&mut header).is_err() || &header != b"%PDF-" {
            return Err(ValidationError::InvalidPdf.into());
        }
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("invoice")
        .to_string();
    Ok(SelectedFile {
        path: path.to_path_buf(),
        file_name,
        mime,
        size,
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    FileSelected,
    Submitting,
    Navigated(UploadJob),
    Error(String),
}

/// Drop zone plus submit button. One file, one upload in flight.
#[derive(Debug)]
pub struct UploadForm {
    state: UploadState,
    file: Option<SelectedFile>,
    drag_active: bool,
    notice: Option<String>,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadForm {
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            file: None,
            drag_active: false,
            notice: None,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn drag_active(&self) -> bool {
        self.drag_active
    }

    /// Blocking message from the last rejected selection, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn drag_enter(&mut self) {
        self.drag_active = true;
    }

    pub fn drag_leave(&mut self) {
        self.drag_active = false;
    }

    pub fn can_submit(&self) -> bool {
        self.file.is_some() && self.state != UploadState::Submitting
    }

    /// Accept a dropped or picked file. A rejected file leaves the form as it was.
    pub fn select_file(&mut self, path: &Path, source: FileSource) -> Result<&SelectedFile> {
        if source == FileSource::Dropped {
            self.drag_active = false;
        }
        if self.state == UploadState::Submitting {
            return Err(ValidationError::UploadInProgress.into());
        }
        match inspect_file(path, source) {
            Ok(file) => {
                info!(file = %file.file_name, size = file.size, mime = file.mime, "file selected");
                self.notice = None;
                self.state = UploadState::FileSelected;
                Ok(&*self.file.insert(file))
            }
            Err(e) => {
                warn!(path = %path.display(), "rejected file: {}", e);
                self.notice = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Upload the selected file. On failure the file is kept so the user can retry.
    pub fn submit(&mut self, api: &dyn InvoiceApi) -> Result<UploadJob> {
        if self.state == UploadState::Submitting {
            return Err(ValidationError::UploadInProgress.into());
        }
        let file = self.file.clone().ok_or(ValidationError::NoFileSelected)?;
        self.state = UploadState::Submitting;
        info!(file = %file.file_name, "submitting upload");

        match api.upload_invoice(&file).and_then(|resp| job_from_response(&file, resp)) {
            Ok(job) => {
                info!(task_id = %job.job_id, "upload accepted");
                self.state = UploadState::Navigated(job.clone());
                Ok(job)
            }
            Err(e) => {
                warn!("upload failed: {}", e);
                self.state = UploadState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Back to an empty form, e.g. after the user starts another invoice.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn job_from_response(file: &SelectedFile, resp: crate::types::UploadResponse) -> Result<UploadJob> {
    if !resp.success {
        let message = if resp.message.is_empty() {
            "Upload was not accepted.".to_string()
        } else {
            resp.message
        };
        return Err(AppError::transport(None, message));
    }
    let job_id = require_identifier(Some(resp.task_id.as_str()), "task id")
        .map_err(|_| AppError::Parse("upload response has no task_id".to_string()))?
        .to_string();
    Ok(UploadJob {
        file_reference: file.file_name.clone(),
        job_id,
        invoice_id: resp.invoice_id.filter(|s| !s.trim().is_empty()),
        created_status: JobStatus::Queued,
    })
}
