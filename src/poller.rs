use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{require_identifier, InvoiceApi};
use crate::config::Config;
use crate::error::Result;
use crate::types::{JobStatus, ReconciliationResult};

/// Longest single sleep between cancellation checks.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// 0 = unbounded.
    pub max_attempts: u32,
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Shared flag that stops a poll loop. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the flag before the next poll loop.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(ReconciliationResult),
    Failed(String),
    Cancelled,
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Still processing; exactly one more tick is due after the interval.
    Pending(ReconciliationResult),
    Done(PollOutcome),
}

/// Fixed-interval poll of one job until it reaches a terminal status.
pub struct ResultPoller<'a> {
    api: &'a dyn InvoiceApi,
    task_id: String,
    settings: PollSettings,
    cancel: CancelToken,
    attempts: u32,
    outcome: Option<PollOutcome>,
}

impl<'a> ResultPoller<'a> {
    pub fn new(
        api: &'a dyn InvoiceApi,
        task_id: &str,
        settings: PollSettings,
        cancel: CancelToken,
    ) -> Result<Self> {
        let task_id = require_identifier(Some(task_id), "task id")?.to_string();
        Ok(Self {
            api,
            task_id,
            settings,
            cancel,
            attempts: 0,
            outcome: None,
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// One request. After a terminal outcome further ticks replay it without calling the API.
    pub fn tick(&mut self) -> PollStep {
        if let Some(outcome) = &self.outcome {
            return PollStep::Done(outcome.clone());
        }
        if self.cancel.is_cancelled() {
            return self.finish(PollOutcome::Cancelled);
        }
        if self.exhausted() {
            warn!(task_id = %self.task_id, attempts = self.attempts, "giving up on job");
            return self.finish(PollOutcome::GaveUp {
                attempts: self.attempts,
            });
        }

        self.attempts += 1;
        let response = self.api.get_results(&self.task_id);

        // The view may have been torn down while the request was in flight.
        if self.cancel.is_cancelled() {
            debug!(task_id = %self.task_id, "discarding response after cancel");
            return self.finish(PollOutcome::Cancelled);
        }

        match response {
            Ok(result) => {
                debug!(
                    task_id = %self.task_id,
                    attempt = self.attempts,
                    status = %result.status,
                    "poll"
                );
                let status = result.status.clone();
                match status {
                    s if s.is_pending() => PollStep::Pending(result),
                    JobStatus::Completed => {
                        info!(task_id = %self.task_id, attempts = self.attempts, "job completed");
                        self.finish(PollOutcome::Completed(result))
                    }
                    JobStatus::Failed => {
                        let message = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "Processing failed".to_string());
                        warn!(task_id = %self.task_id, %message, "job failed");
                        self.finish(PollOutcome::Failed(message))
                    }
                    other => {
                        warn!(task_id = %self.task_id, status = %other, "unexpected job status");
                        let message = format!("Unexpected job status: {}", other);
                        self.finish(PollOutcome::Failed(message))
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %self.task_id, "error polling for results: {}", e);
                self.finish(PollOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Tick, wait, tick... until done. `on_pending` sees every non-terminal snapshot.
    pub fn run(&mut self, mut on_pending: impl FnMut(&ReconciliationResult)) -> PollOutcome {
        info!(
            task_id = %self.task_id,
            interval_ms = self.settings.interval.as_millis() as u64,
            "polling for results"
        );
        loop {
            match self.tick() {
                PollStep::Pending(result) => {
                    on_pending(&result);
                    if !self.exhausted() {
                        self.wait();
                    }
                }
                PollStep::Done(outcome) => return outcome,
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.settings.max_attempts > 0 && self.attempts >= self.settings.max_attempts
    }

    fn wait(&self) {
        let mut remaining = self.settings.interval;
        while !remaining.is_zero() && !self.cancel.is_cancelled() {
            let slice = remaining.min(CANCEL_CHECK_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }

    fn finish(&mut self, outcome: PollOutcome) -> PollStep {
        self.outcome = Some(outcome.clone());
        PollStep::Done(outcome)
    }
}
