//! Retry orchestrator state machine
//!
//! [`RetryState`] holds everything one logical call owns (its conversation,
//! attempt counter, usage totals and failure history) and decides what
//! happens after each attempt. It performs no I/O, so the async and blocking
//! clients drive the same transitions.

pub mod policy;
pub mod reask;
pub mod usage;

pub use policy::RetryPolicy;
pub use reask::{append_reask, corrective_text, TOOL_FAILURE};
pub use usage::UsageAccumulator;

use crate::error::{CoerceError, ParseFailure, TerminalRetryError};
use crate::modes::Mode;
use crate::protocol::{ChatRequest, CompletionUsage, RawResponse};
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of resolving one attempt
#[derive(Debug)]
pub enum Step<T> {
    /// Parsed successfully
    Done(T),
    /// Corrective turns were appended; call the transport again
    Retry,
}

/// Call-scoped retry state
#[derive(Debug)]
pub struct RetryState {
    mode: Mode,
    max_retries: u32,
    attempt: u32,
    usage: UsageAccumulator,
    history: Vec<ParseFailure>,
    request: ChatRequest,
}

impl RetryState {
    pub fn new(mode: Mode, max_retries: u32, request: ChatRequest) -> Self {
        Self {
            mode,
            max_retries,
            attempt: 0,
            usage: UsageAccumulator::new(),
            history: Vec::new(),
            request,
        }
    }

    /// The request to send on the next attempt
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn total_usage(&self) -> CompletionUsage {
        self.usage.total()
    }

    pub fn history(&self) -> &[ParseFailure] {
        &self.history
    }

    /// Number of corrective rounds appended so far
    pub fn retries(&self) -> u32 {
        self.history.len() as u32
    }

    /// Mark the start of an attempt
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        debug!(mode = %self.mode, attempt = self.attempt, "starting attempt");
        self.attempt
    }

    /// Accept a fully received response: fold its usage into the running
    /// total and overwrite its usage with that total
    pub fn record_response(&mut self, mut raw: RawResponse) -> Arc<RawResponse> {
        self.usage.absorb(&mut raw);
        Arc::new(raw)
    }

    /// Wrap a transport failure; these are never retried
    pub fn transport_failed(&self, source: TransportError) -> CoerceError {
        warn!(
            mode = %self.mode,
            attempt = self.attempt,
            error = %source,
            "transport failed, not retrying"
        );
        CoerceError::Transport {
            attempt: self.attempt,
            failures: self.history.clone(),
            source,
        }
    }

    /// Decide what follows an attempt whose response has been parsed
    pub fn resolve<T>(
        &mut self,
        raw: Arc<RawResponse>,
        outcome: Result<T, CoerceError>,
    ) -> Result<Step<T>, CoerceError> {
        let failure = match outcome {
            Ok(value) => {
                if self.attempt > 1 {
                    info!(mode = %self.mode, attempts = self.attempt, "succeeded after re-asking");
                }
                return Ok(Step::Done(value));
            }
            Err(err) => ParseFailure::try_from(err)?,
        };

        warn!(
            mode = %self.mode,
            attempt = self.attempt,
            max_retries = self.max_retries,
            error = %failure,
            "response failed validation"
        );

        append_reask(&mut self.request, self.mode, &raw, &failure);
        self.history.push(failure.clone());

        if self.attempt <= self.max_retries {
            return Ok(Step::Retry);
        }

        Err(CoerceError::RetriesExhausted(Box::new(TerminalRetryError {
            attempts: self.attempt,
            last_completion: Some(raw),
            total_usage: self.usage.total(),
            cause: failure,
            history: std::mem::take(&mut self.history),
        })))
    }

    /// Delay before the next attempt
    pub fn delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.retries().saturating_sub(1))
    }
}
