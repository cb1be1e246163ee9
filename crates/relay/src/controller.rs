//! The relay controller: one request from validation to final outcome.
//!
//! # State machine
//!
//! `Composing → Invoking → (Succeeded | Retrying → Invoking | Failed)`
//!
//! Composition runs before anything is sent upstream, so a validation error
//! is returned from [`RelayController::handle`] even for streaming requests.
//! Transient failures are retried with backoff while the attempt budget lasts
//! and nothing has been delivered yet. Once a fragment has reached the
//! caller, a failure ends the stream with a partial error instead.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use mailmate_config::AppConfig;
use mailmate_core::{HistoryEntry, Provider, ProviderError, RelayError, Usage, ValidationError};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::composer::{ComposedPrompt, TaskParams, compose};
use crate::context::{ContextBudget, build_window};
use crate::event::RelayEvent;
use crate::mode::{DEFAULT_SYSTEM_PROMPT, TaskMode};
use crate::model_gateway::ModelGateway;
use crate::retry::RetryPolicy;

/// Events buffered between the producer task and a slow consumer.
const STREAM_BUFFER: usize = 32;

/// Lifecycle of one request. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Composing,
    Invoking,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Composing => "composing",
            Self::Invoking => "invoking",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One relay request.
#[derive(Debug, Clone, Default)]
pub struct RelayRequest {
    pub mode: TaskMode,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub params: TaskParams,
    pub stream: bool,
}

impl RelayRequest {
    pub fn new(mode: TaskMode, message: impl Into<String>) -> Self {
        Self {
            mode,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// The result of a request that passed validation.
#[derive(Debug)]
pub enum RelayOutcome {
    Completed {
        text: String,
        usage: Option<Usage>,
        attempts: u32,
    },
    Streaming(RelayStream),
}

/// Ordered relay events for one streaming request.
///
/// Yields fragments then exactly one terminal event. Dropping the stream
/// cancels the upstream exchange.
pub struct RelayStream {
    rx: mpsc::Receiver<RelayEvent>,
    _cancel_on_drop: DropGuard,
}

impl RelayStream {
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        self.rx.recv().await
    }
}

impl fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayStream").finish_non_exhaustive()
    }
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

pub struct RelayController {
    gateway: ModelGateway,
    budget: ContextBudget,
    retry: RetryPolicy,
    system_prompt: String,
}

impl RelayController {
    pub fn new(gateway: ModelGateway) -> Self {
        Self {
            gateway,
            budget: ContextBudget::default(),
            retry: RetryPolicy::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        let controller = Self::new(ModelGateway::from_config(provider, &config.provider))
            .with_budget(ContextBudget::from(&config.context))
            .with_retry(RetryPolicy::from(&config.retry));
        match &config.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => controller.with_system_prompt(prompt),
            _ => controller,
        }
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Build the prompt a request would send, without sending it.
    pub fn compose(&self, request: &RelayRequest) -> Result<ComposedPrompt, ValidationError> {
        let window = build_window(&request.history, &request.message, &self.budget)?;
        if window.dropped() > 0 {
            debug!(
                dropped = window.dropped(),
                kept = window.history().len(),
                "Trimmed history to fit the context budget"
            );
        }
        compose(request.mode, &window, &request.params, &self.system_prompt)
    }

    /// Run one request.
    ///
    /// Validation errors come back as `Err` regardless of streaming. A
    /// streaming request otherwise returns immediately with a
    /// [`RelayStream`]; its failures arrive as a terminal error event.
    pub async fn handle(
        &self,
        request: RelayRequest,
        cancel: CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        let span = info_span!(
            "relay",
            mode = %request.mode,
            stream = request.stream,
            provider = %self.gateway.provider_name(),
        );

        debug!(parent: &span, state = %RelayState::Composing, history = request.history.len());
        let prompt = match self.compose(&request) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(parent: &span, state = %RelayState::Failed, error = %e, "Rejected request");
                return Err(e.into());
            }
        };

        if request.stream {
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);
            let guard = cancel.clone().drop_guard();
            let producer = Producer {
                gateway: self.gateway.clone(),
                retry: self.retry,
                prompt,
                cancel,
                tx,
            };
            tokio::spawn(producer.run().instrument(span));
            Ok(RelayOutcome::Streaming(RelayStream {
                rx,
                _cancel_on_drop: guard,
            }))
        } else {
            self.complete(prompt, cancel).instrument(span).await
        }
    }

    async fn complete(
        &self,
        prompt: ComposedPrompt,
        cancel: CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(state = %RelayState::Invoking, attempt);
            match self.gateway.complete(&prompt, &cancel).await {
                Ok((text, usage)) => {
                    info!(state = %RelayState::Succeeded, attempt, chars = text.len(), "Relay completed");
                    return Ok(RelayOutcome::Completed {
                        text,
                        usage,
                        attempts: attempt,
                    });
                }
                Err(e) => after_failure(&self.retry, attempt, e, &cancel).await?,
            }
        }
    }
}

/// Decide what a failed attempt means. `Ok` means wait has elapsed and the
/// next attempt may start.
async fn after_failure(
    retry: &RetryPolicy,
    attempt: u32,
    err: ProviderError,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    if matches!(err, ProviderError::Cancelled) || cancel.is_cancelled() {
        info!(state = %RelayState::Failed, attempt, "Relay cancelled");
        return Err(RelayError::Cancelled);
    }
    if !err.is_transient() {
        warn!(state = %RelayState::Failed, attempt, error = %err, "Provider rejected request");
        return Err(RelayError::Fatal(err));
    }
    if !retry.allows_retry(attempt) {
        warn!(state = %RelayState::Failed, attempt, error = %err, "Retry budget exhausted");
        return Err(RelayError::RetriesExhausted {
            attempts: attempt,
            last: err,
        });
    }

    let delay = retry.delay_after(attempt, &err);
    info!(
        state = %RelayState::Retrying,
        attempt,
        delay_ms = millis(delay),
        error = %err,
        "Transient provider failure, backing off"
    );
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Background task feeding one [`RelayStream`].
struct Producer {
    gateway: ModelGateway,
    retry: RetryPolicy,
    prompt: ComposedPrompt,
    cancel: CancellationToken,
    tx: mpsc::Sender<RelayEvent>,
}

impl Producer {
    async fn run(self) {
        let mut attempt = 0;
        let mut full_text = String::new();

        'attempts: loop {
            attempt += 1;
            debug!(state = %RelayState::Invoking, attempt);

            let mut fragments = match self.gateway.open_stream(&self.prompt, &self.cancel).await {
                Ok(fragments) => fragments,
                Err(e) => match after_failure(&self.retry, attempt, e, &self.cancel).await {
                    Ok(()) => continue 'attempts,
                    Err(err) => return self.fail(err, false).await,
                },
            };

            while let Some(item) = fragments.next().await {
                match item {
                    Ok(text) => {
                        full_text.push_str(&text);
                        if !self.deliver(RelayEvent::Fragment { text }, true).await {
                            return;
                        }
                    }
                    Err(e) if full_text.is_empty() => {
                        match after_failure(&self.retry, attempt, e, &self.cancel).await {
                            Ok(()) => continue 'attempts,
                            Err(err) => return self.fail(err, false).await,
                        }
                    }
                    Err(e) => {
                        warn!(
                            state = %RelayState::Failed,
                            attempt,
                            delivered = full_text.len(),
                            error = %e,
                            "Stream failed after output was delivered"
                        );
                        return self.fail(RelayError::from_provider(e), true).await;
                    }
                }
            }

            info!(state = %RelayState::Succeeded, attempt, chars = full_text.len(), "Relay stream completed");
            let done = RelayEvent::Done {
                full_text,
                usage: fragments.usage(),
            };
            self.deliver(done, true).await;
            return;
        }
    }

    async fn fail(&self, err: RelayError, partial: bool) {
        self.deliver(RelayEvent::failure(&err, partial), partial).await;
    }

    /// Hand one event to the consumer, waiting for buffer space unless the
    /// request is cancelled first. `false` means production must stop.
    async fn deliver(&self, event: RelayEvent, partial: bool) -> bool {
        tokio::select! {
            biased;
            sent = self.tx.send(event) => {
                if sent.is_err() {
                    debug!("Stream consumer went away");
                }
                sent.is_ok()
            }
            _ = self.cancel.cancelled() => {
                info!(state = %RelayState::Failed, "Relay cancelled while the consumer was behind");
                // The buffer is full, so the terminal event is best effort.
                let _ = self
                    .tx
                    .try_send(RelayEvent::failure(&RelayError::Cancelled, partial));
                false
            }
        }
    }
}
