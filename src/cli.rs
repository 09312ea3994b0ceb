use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api::{HttpApi, InvoiceApi};
use crate::config::Config;
use crate::error::{AppError, Result, ValidationError};
use crate::excel;
use crate::poller::{CancelToken, PollOutcome, PollSettings, PollStep, ResultPoller};
use crate::render;
use crate::review::{Dialog, ReviewPanel};
use crate::session::Session;
use crate::shell::{self, Route};
use crate::types::{ExtractedFields, FileSource};
use crate::upload::{validate_invoice_file, UploadForm};

#[derive(Parser, Debug)]
#[command(
    name = "invoice-reconciler",
    version,
    about = "Upload invoices, review extracted fields, save corrections"
)]
pub struct Cli {
    /// Backend base URL (overrides INVOICE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload an invoice and wait for the extracted fields
    Upload {
        file: PathBuf,
        /// Print the task id and return without polling
        #[arg(long)]
        no_wait: bool,
    },
    /// Show results for a task, polling while it is processing
    Results {
        task_id: String,
        /// Fetch once instead of polling
        #[arg(long)]
        once: bool,
        /// Also print the raw extracted data
        #[arg(long)]
        raw: bool,
    },
    /// Check a file against the upload rules without contacting the server
    Validate { file: PathBuf },
    /// Save edited fields (JSON with the display keys) for an invoice
    Save { invoice_id: String, data: PathBuf },
    /// Write edited fields (JSON file, object or array) to an .xlsx workbook
    Export {
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Open the workbook afterwards
        #[arg(long)]
        open: bool,
    },
    /// Render a page of the navigation shell
    Nav {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Interactive session (default)
    Session,
}

pub fn execute(cli: Cli) -> Result<()> {
    let config = Config::load().with_api_url(cli.api_url);
    let mut stdout = io::stdout().lock();
    match cli.command.unwrap_or(Command::Session) {
        Command::Validate { file } => {
            let result = validate_invoice_file(&file);
            writeln!(stdout, "{}", serde_json::to_string_pretty(&result)?)?;
            if result.valid {
                Ok(())
            } else {
                Err(ValidationError::InvalidInput(result.error.unwrap_or_default()).into())
            }
        }
        Command::Export { data, out, open } => {
            let invoices = read_fields_file(&data)?;
            let path = excel::export_invoices_to_excel(&invoices, out.as_deref())?;
            writeln!(stdout, "Exported to {}", path.display())?;
            if open {
                opener::open(&path).map_err(|e| AppError::Export(e.to_string()))?;
            }
            Ok(())
        }
        Command::Nav { path } => {
            let route = Route::parse(&path);
            let body = match &route {
                Route::Upload => render::upload_form(&UploadForm::new()),
                Route::Dashboard => {
                    "Run `invoice-reconciler session` to start working.".to_string()
                }
                other => shell::unavailable(other),
            };
            write!(stdout, "{}", shell::render_frame(&route, &body))?;
            Ok(())
        }
        command => {
            info!(api = %config.api_base_url, "using backend");
            let api = HttpApi::new(&config)?;
            let poll = PollSettings::from(&config);
            match command {
                Command::Upload { file, no_wait } => {
                    let cancel = interruptible(CancelToken::new());
                    upload(&api, poll, cancel, &file, no_wait, &mut stdout)
                }
                Command::Results { task_id, once, raw } => {
                    let cancel = interruptible(CancelToken::new());
                    let view = ResultsView { once, raw };
                    results(&api, poll, cancel, &task_id, view, &mut stdout)
                }
                Command::Save { invoice_id, data } => {
                    save(&api, &invoice_id, &data, &mut stdout)
                }
                _ => {
                    let mut session = Session::new(api, poll);
                    interruptible(session.interrupt_token());
                    session.run(io::stdin().lock(), &mut stdout)?;
                    Ok(())
                }
            }
        }
    }
}

/// Ctrl-C cancels `token` instead of killing the process.
fn interruptible(token: CancelToken) -> CancelToken {
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
    token
}

#[derive(Debug, Clone, Copy, Default)]
struct ResultsView {
    once: bool,
    raw: bool,
}

fn upload(
    api: &dyn InvoiceApi,
    poll: PollSettings,
    cancel: CancelToken,
    file: &Path,
    no_wait: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut form = UploadForm::new();
    form.select_file(file, FileSource::Picked)?;
    let job = form.submit(api)?;
    writeln!(out, "Uploaded {}. Task ID: {}", job.file_reference, job.job_id)?;
    if let Some(invoice_id) = &job.invoice_id {
        writeln!(out, "Invoice ID: {}", invoice_id)?;
    }
    if no_wait {
        return Ok(());
    }
    results(api, poll, cancel, &job.job_id, ResultsView::default(), out)
}

fn results(
    api: &dyn InvoiceApi,
    poll: PollSettings,
    cancel: CancelToken,
    task_id: &str,
    view: ResultsView,
    out: &mut impl Write,
) -> Result<()> {
    let mut poller = ResultPoller::new(api, task_id, poll, cancel)?;
    let outcome = if view.once {
        match poller.tick() {
            PollStep::Pending(r) => {
                writeln!(out, "{}", render::busy(&r.job_id))?;
                return Ok(());
            }
            PollStep::Done(outcome) => outcome,
        }
    } else {
        writeln!(out, "{}", render::busy(poller.task_id()))?;
        poller.run(|_| {})
    };
    match outcome {
        PollOutcome::Completed(result) => {
            write!(out, "{}", render::result(&result))?;
            if let Some(id) = &result.invoice_id {
                writeln!(out, "\nInvoice ID: {}", id)?;
            }
            if view.raw {
                writeln!(out, "\nOCR Raw Data\n{}", render::raw(&result))?;
            }
            Ok(())
        }
        PollOutcome::Failed(message) => Err(AppError::transport(None, message)),
        PollOutcome::GaveUp { attempts } => Err(AppError::transport(
            None,
            format!("Still processing after {} checks. Try again later.", attempts),
        )),
        PollOutcome::Cancelled => {
            writeln!(out, "Stopped waiting for task {}.", poller.task_id())?;
            Ok(())
        }
    }
}

fn save(api: &dyn InvoiceApi, invoice_id: &str, data: &Path, out: &mut impl Write) -> Result<()> {
    let mut invoices = read_fields_file(data)?;
    if invoices.len() != 1 {
        return Err(AppError::Parse(format!(
            "{} must hold exactly one invoice, found {}",
            data.display(),
            invoices.len()
        )));
    }
    let mut panel = ReviewPanel::with_fields(invoice_id, invoices.remove(0));
    let dialog = panel.save(api)?;
    writeln!(out, "{}", render::dialog(&dialog))?;
    match dialog {
        Dialog::Success(_) => Ok(()),
        Dialog::Failure(msg) => Err(AppError::transport(None, msg)),
    }
}

/// One invoice object or an array of them, using the save endpoint's display keys.
pub fn read_fields_file(path: &Path) -> Result<Vec<ExtractedFields>> {
    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let invoices = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(invoices)
}
