use reqwest::blocking::{multipart, Client, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::fs;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result, ValidationError};
use crate::types::{
    ExtractedFields, ReconciliationResult, ResultsWire, SaveRequest, SaveResponse, SelectedFile,
    UploadResponse,
};

pub const UPLOAD_PATH: &str = "/api/upload-invoice";
pub const RESULTS_PATH: &str = "/api/results";
pub const SAVE_PATH: &str = "/api/invoice/save";
pub const UPLOAD_FIELD: &str = "invoice_file";

/// The three backend calls the views depend on.
pub trait InvoiceApi {
    fn upload_invoice(&self, file: &SelectedFile) -> Result<UploadResponse>;
    fn get_results(&self, task_id: &str) -> Result<ReconciliationResult>;
    fn save_invoice_data(
        &self,
        invoice_id: &str,
        edited: &ExtractedFields,
    ) -> Result<SaveResponse>;
}

/// Trimmed identifier, or a validation error naming what was missing.
pub fn require_identifier<'a>(value: Option<&'a str>, what: &'static str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingIdentifier(what).into()),
    }
}

pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::transport(None, e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/api/results/{task_id}` with the id escaped as a single path segment.
    fn results_url(&self, task_id: &str) -> Result<Url> {
        let invalid =
            |detail: String| AppError::transport(None, format!("Invalid API URL: {}", detail));
        let mut url = Url::parse(&self.url(RESULTS_PATH)).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(self.base_url.clone()))?
            .push(task_id);
        Ok(url)
    }
}

impl InvoiceApi for HttpApi {
    fn upload_invoice(&self, file: &SelectedFile) -> Result<UploadResponse> {
        let bytes = fs::read(&file.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::Validation(ValidationError::FileNotFound)
            } else {
                AppError::Io(e)
            }
        })?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(file.mime)?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let url = self.url(UPLOAD_PATH);
        debug!(%url, file = %file.file_name, size = file.size, "uploading invoice");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .multipart(form)
            .send()?;
        decode_json(check_status(response, "Upload failed")?)
    }

    fn get_results(&self, task_id: &str) -> Result<ReconciliationResult> {
        let task_id = require_identifier(Some(task_id), "task id")?;
        let url = self.results_url(task_id)?;
        debug!(%url, "fetching results");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()?;
        let wire: ResultsWire =
            decode_json(check_status(response, "Error getting results")?)?;
        ReconciliationResult::from_wire(task_id, wire)
    }

    fn save_invoice_data(
        &self,
        invoice_id: &str,
        edited: &ExtractedFields,
    ) -> Result<SaveResponse> {
        let invoice_id = require_identifier(Some(invoice_id), "invoice id")?;
        let url = self.url(SAVE_PATH);
        debug!(%url, %invoice_id, "saving invoice data");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&SaveRequest {
                invoice_id,
                edited_data: edited,
            })
            .send()?;
        decode_json(check_status(response, "Save failed")?)
    }
}

/// Non-2xx responses become transport errors carrying the server's message.
fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = server_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            context.to_string()
        } else {
            format!("{}: {}", context, body.trim())
        }
    });
    warn!(status = status.as_u16(), %message, "{}", context);
    Err(AppError::transport(Some(status.as_u16()), message))
}

/// Pull `error` or `message` out of a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("error")
        .or_else(|| json.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text()?;
    serde_json::from_str(&text).map_err(|e| {
        warn!("Invalid JSON from server: {}", e);
        AppError::Parse(format!("Invalid JSON: {}", e))
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Records every call and replays scripted responses in order.
    #[derive(Default)]
    pub struct FakeApi {
        pub uploads: RefCell<Vec<String>>,
        pub result_calls: RefCell<Vec<String>>,
        pub saves: RefCell<Vec<(String, ExtractedFields)>>,
        pub upload_responses: RefCell<VecDeque<Result<UploadResponse>>>,
        pub results: RefCell<VecDeque<Result<ReconciliationResult>>>,
        pub save_responses: RefCell<VecDeque<Result<SaveResponse>>>,
    }

    impl FakeApi {
        pub fn network_calls(&self) -> usize {
            self.uploads.borrow().len()
                + self.result_calls.borrow().len()
                + self.saves.borrow().len()
        }
    }

    impl InvoiceApi for FakeApi {
        fn upload_invoice(&self, file: &SelectedFile) -> Result<UploadResponse> {
            self.uploads.borrow_mut().push(file.file_name.clone());
            self.upload_responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::transport(Some(500), "no scripted upload")))
        }

        fn get_results(&self, task_id: &str) -> Result<ReconciliationResult> {
            self.result_calls.borrow_mut().push(task_id.to_string());
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::transport(Some(500), "no scripted result")))
        }

        fn save_invoice_data(
            &self,
            invoice_id: &str,
            edited: &ExtractedFields,
        ) -> Result<SaveResponse> {
            self.saves
                .borrow_mut()
                .push((invoice_id.to_string(), edited.clone()));
            self.save_responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::transport(Some(500), "no scripted save")))
        }
    }
}
