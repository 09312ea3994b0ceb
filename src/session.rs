//! The interactive client: one line in, one view out.

use chrono::{DateTime, Local};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::api::{require_identifier, InvoiceApi};
use crate::error::{Result, ValidationError};
use crate::excel;
use crate::poller::{CancelToken, PollOutcome, PollSettings, ResultPoller};
use crate::render;
use crate::review::{Dialog, ReviewPanel};
use crate::shell::{self, Route};
use crate::types::{ExtractedFields, FileSource, InvoiceField, LineItemColumn, ReconciliationResult};
use crate::upload::UploadForm;

const RECENT_LIMIT: usize = 10;

const HELP: &str = "\
Commands:
  nav <path>                 go to /, /upload, /results/<task_id>, /reports, /analytics
  drop <file> | pick <file>  choose the invoice to upload
  upload                     upload the chosen file and wait for results
  results <task_id>          poll an existing job
  show | raw                 extracted fields / raw OCR data
  set <field> <value>        bill_to, email, invoice_number, invoice_date, invoice_amount
  item <n> <column> <value>  service, quantity, unit_price, amount
  add-item | remove-item <n>
  revert                     discard edits
  save                       save edits for the current invoice
  export [path]              write saved invoices to .xlsx
  help | quit

Ctrl-C stops waiting for results. Edits are kept.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub at: DateTime<Local>,
    pub label: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct Session<A: InvoiceApi> {
    api: A,
    poll: PollSettings,
    route: Route,
    form: UploadForm,
    review: ReviewPanel,
    last_result: Option<ReconciliationResult>,
    last_error: Option<String>,
    current_task: Option<String>,
    saved: Vec<(String, ExtractedFields)>,
    recent: Vec<Activity>,
    interrupt: CancelToken,
}

impl<A: InvoiceApi> Session<A> {
    pub fn new(api: A, poll: PollSettings) -> Self {
        Self {
            api,
            poll,
            route: Route::Dashboard,
            form: UploadForm::new(),
            review: ReviewPanel::new(),
            last_result: None,
            last_error: None,
            current_task: None,
            saved: Vec::new(),
            recent: Vec::new(),
            interrupt: CancelToken::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn review(&self) -> &ReviewPanel {
        &self.review
    }

    pub fn recent(&self) -> &[Activity] {
        &self.recent
    }

    /// Token that stops the poll loop currently running, e.g. from a Ctrl-C handler.
    /// It is re-armed at the start of every poll.
    pub fn interrupt_token(&self) -> CancelToken {
        self.interrupt.clone()
    }

    /// Read commands until `quit` or end of input.
    pub fn run(&mut self, input: impl BufRead, out: &mut impl Write) -> io::Result<()> {
        write!(out, "{}", self.page())?;
        write!(out, "> ")?;
        out.flush()?;
        for line in input.lines() {
            let line = line?;
            if self.dispatch(&line, out)? == Control::Quit {
                break;
            }
            write!(out, "> ")?;
            out.flush()?;
        }
        Ok(())
    }

    /// Handle one command line. Failures are shown and the session stays usable.
    pub fn dispatch(&mut self, line: &str, out: &mut impl Write) -> io::Result<Control> {
        match self.handle(line, out) {
            Ok(control) => Ok(control),
            Err(e) => {
                debug!("command failed: {}", e);
                writeln!(out, "! {}", e)?;
                Ok(Control::Continue)
            }
        }
    }

    fn handle(&mut self, line: &str, out: &mut impl Write) -> Result<Control> {
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match cmd {
            "" => {}
            "help" | "?" => writeln!(out, "{}", HELP)?,
            "quit" | "exit" | "q" => return Ok(Control::Quit),
            "nav" | "go" => self.navigate(Route::parse(rest), out)?,
            "drop" => {
                self.form.drag_enter();
                self.choose_file(Path::new(rest), FileSource::Dropped, out)?
            }
            "pick" | "browse" => self.choose_file(Path::new(rest), FileSource::Picked, out)?,
            "upload" | "submit" => self.submit(out)?,
            "results" => self.navigate(Route::Results(rest.to_string()), out)?,
            "show" => self.show_review(out)?,
            "raw" => {
                let text = match &self.last_result {
                    Some(r) => render::raw(r),
                    None => "No OCR data available".to_string(),
                };
                writeln!(out, "{}", text)?
            }
            "set" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let field = InvoiceField::parse(key).ok_or_else(|| {
                    ValidationError::InvalidInput(format!("Unknown field '{}'", key))
                })?;
                self.review.set_field(field, value.trim())?;
                self.show_review(out)?
            }
            "item" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                let index = parse_row(parts.next().unwrap_or(""))?;
                let key = parts.next().unwrap_or("");
                let column = LineItemColumn::parse(key).ok_or_else(|| {
                    ValidationError::InvalidInput(format!("Unknown column '{}'", key))
                })?;
                self.review
                    .set_line_item(index, column, parts.next().unwrap_or("").trim())?;
                self.show_review(out)?
            }
            "add-item" => {
                let idx = self.review.add_line_item()?;
                writeln!(out, "Added service row {}", idx + 1)?
            }
            "remove-item" => {
                self.review.remove_line_item(parse_row(rest)?)?;
                self.show_review(out)?
            }
            "revert" => {
                self.review.revert();
                self.show_review(out)?
            }
            "save" => self.save(out)?,
            "export" => {
                let target = (!rest.is_empty()).then(|| PathBuf::from(rest));
                let path = self.export(target.as_deref())?;
                writeln!(out, "Exported to {}", path.display())?
            }
            other => writeln!(out, "Unknown command '{}'. Type 'help'.", other)?,
        }
        Ok(Control::Continue)
    }

    fn page(&self) -> String {
        let body = match &self.route {
            Route::Dashboard => self.dashboard(),
            Route::Upload => render::upload_form(&self.form),
            Route::Results(task) => match (&self.last_error, &self.last_result) {
                (Some(message), _) => render::error(message),
                (None, Some(r)) if &r.job_id == task => render::result(r),
                (None, _) => render::busy(task),
            },
            other => shell::unavailable(other),
        };
        shell::render_frame(&self.route, &body)
    }

    fn dashboard(&self) -> String {
        let mut body = String::from("Recent Activity\n");
        if self.recent.is_empty() {
            body.push_str("  Nothing yet. Go to /upload to process an invoice.\n");
        }
        for a in self.recent.iter().rev() {
            body.push_str(&format!(
                "  {}  {:<28} {}\n",
                a.at.format("%H:%M:%S"),
                a.label,
                a.detail
            ));
        }
        body.push_str(&format!(
            "\nSaved this session: {}  (export to write them to Excel)\n",
            self.saved.len()
        ));
        body
    }

    fn record(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.recent.push(Activity {
            at: Local::now(),
            label: label.into(),
            detail: detail.into(),
        });
        if self.recent.len() > RECENT_LIMIT {
            self.recent.remove(0);
        }
    }

    fn navigate(&mut self, route: Route, out: &mut impl Write) -> Result<()> {
        info!(route = %route, "navigate");
        self.route = route.clone();
        if let Route::Results(task) = route {
            self.watch(&task, out)?;
        }
        write!(out, "{}", self.page())?;
        Ok(())
    }

    fn choose_file(&mut self, path: &Path, source: FileSource, out: &mut impl Write) -> Result<()> {
        self.route = Route::Upload;
        let result = self.form.select_file(path, source).map(|_| ());
        write!(out, "{}", self.page())?;
        result
    }

    fn submit(&mut self, out: &mut impl Write) -> Result<()> {
        self.route = Route::Upload;
        let job = match self.form.submit(&self.api) {
            Ok(job) => job,
            Err(e) => {
                self.record("Upload failed", e.to_string());
                write!(out, "{}", self.page())?;
                return Err(e);
            }
        };
        self.record(format!("Uploaded {}", job.file_reference), format!("task {}", job.job_id));
        self.start_job(&job.job_id, job.invoice_id.clone());
        self.form.reset();
        self.navigate(Route::Results(job.job_id), out)
    }

    /// A different task means a different invoice: start a fresh review.
    fn start_job(&mut self, task_id: &str, invoice_id: Option<String>) {
        if self.current_task.as_deref() != Some(task_id) {
            self.review = ReviewPanel::new();
            self.last_result = None;
            self.last_error = None;
            self.current_task = Some(task_id.to_string());
        }
        self.review.set_invoice_id(invoice_id);
    }

    fn watch(&mut self, task_id: &str, out: &mut impl Write) -> Result<()> {
        let task_id = require_identifier(Some(task_id), "task id")?;
        self.start_job(task_id, None);
        self.last_error = None;
        self.interrupt.reset();
        let mut poller = ResultPoller::new(&self.api, task_id, self.poll, self.interrupt.clone())?;
        writeln!(out, "{}", render::busy(task_id))?;
        match poller.run(|_| {}) {
            PollOutcome::Completed(result) => {
                self.review.load(&result);
                self.record("Extraction completed", format!("task {}", task_id));
                self.last_result = Some(result);
                self.last_error = None;
            }
            PollOutcome::Failed(message) => {
                self.record("Extraction failed", message.clone());
                self.last_error = Some(message);
            }
            PollOutcome::GaveUp { attempts } => {
                self.last_error = Some(format!(
                    "still processing after {} checks; try 'results {}' later",
                    attempts, task_id
                ));
            }
            PollOutcome::Cancelled => {
                self.record("Stopped waiting", format!("task {}", task_id));
                self.last_error = Some(format!(
                    "stopped waiting for task {}; run 'results {}' to check again",
                    task_id, task_id
                ));
            }
        }
        Ok(())
    }

    fn show_review(&self, out: &mut impl Write) -> Result<()> {
        match self.review.fields() {
            Some(fields) => {
                write!(out, "{}", render::fields(fields))?;
                write!(out, "{}", render::warnings(&self.review.warnings()))?;
                if self.review.is_dirty() {
                    writeln!(out, "  (unsaved changes)")?;
                }
            }
            None => writeln!(out, "No extracted data yet.")?,
        }
        Ok(())
    }

    fn save(&mut self, out: &mut impl Write) -> Result<()> {
        let dialog = self.review.save(&self.api)?;
        writeln!(out, "{}", render::dialog(&dialog))?;
        match dialog {
            Dialog::Success(_) => {
                let id = self.review.invoice_id().unwrap_or_default().to_string();
                if let Some(fields) = self.review.fields().cloned() {
                    match self.saved.iter_mut().find(|(saved_id, _)| *saved_id == id) {
                        Some(entry) => entry.1 = fields,
                        None => self.saved.push((id.clone(), fields)),
                    }
                }
                self.record("Invoice saved", format!("invoice {}", id));
            }
            Dialog::Failure(msg) => self.record("Save failed", msg),
        }
        Ok(())
    }

    /// Saved invoices, or the one under review when nothing was saved yet.
    pub fn export(&mut self, target: Option<&Path>) -> Result<PathBuf> {
        let invoices: Vec<ExtractedFields> = if self.saved.is_empty() {
            self.review.fields().cloned().into_iter().collect()
        } else {
            self.saved.iter().map(|(_, f)| f.clone()).collect()
        };
        let path = excel::export_invoices_to_excel(&invoices, target)?;
        self.record("Exported", path.display().to_string());
        Ok(path)
    }
}

/// 1-based row number from the prompt to a 0-based index.
fn parse_row(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => {
            let message = format!("'{}' is not a row number", raw.trim());
            Err(ValidationError::InvalidInput(message).into())
        }
    }
}
