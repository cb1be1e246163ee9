//! Model gateway: one bounded, cancellable exchange with the provider.
//!
//! Wraps a [`Provider`] with the attempt timeout, the per-fragment idle
//! timeout and cancellation. Knows nothing about retries; the controller
//! decides what a failure means.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mailmate_config::ProviderConfig;
use mailmate_core::{ChunkReceiver, Provider, ProviderError, ProviderRequest, Usage};
use tokio_util::sync::CancellationToken;

use crate::composer::ComposedPrompt;

/// Result of a successful `invoke`.
pub enum Invocation {
    Completed { text: String, usage: Option<Usage> },
    Streaming(FragmentStream),
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { text, usage } => f
                .debug_struct("Completed")
                .field("text", text)
                .field("usage", usage)
                .finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

#[derive(Clone)]
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    attempt_timeout: Duration,
    idle_timeout: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            attempt_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ProviderConfig) -> Self {
        Self::new(provider, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(Some(config.max_tokens))
            .with_timeouts(config.request_timeout(), config.stream_idle_timeout())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// `attempt` bounds opening an exchange (and a whole non-streaming
    /// exchange); `idle` bounds the wait for each streamed fragment.
    pub fn with_timeouts(mut self, attempt: Duration, idle: Duration) -> Self {
        self.attempt_timeout = attempt;
        self.idle_timeout = idle;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one exchange in the requested mode.
    pub async fn invoke(
        &self,
        prompt: &ComposedPrompt,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<Invocation, ProviderError> {
        if streaming {
            self.open_stream(prompt, cancel)
                .await
                .map(Invocation::Streaming)
        } else {
            self.complete(prompt, cancel)
                .await
                .map(|(text, usage)| Invocation::Completed { text, usage })
        }
    }

    /// One request/response exchange.
    pub async fn complete(
        &self,
        prompt: &ComposedPrompt,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<Usage>), ProviderError> {
        let request = self.request(prompt, false);
        let response = self.bounded(self.provider.complete(request), cancel).await?;
        Ok((response.text, response.usage))
    }

    /// Open a streaming exchange. Only the open is bounded by the attempt
    /// timeout; fragments are bounded by the idle timeout.
    pub async fn open_stream(
        &self,
        prompt: &ComposedPrompt,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream, ProviderError> {
        let request = self.request(prompt, true);
        let rx = self.bounded(self.provider.stream(request), cancel).await?;
        Ok(FragmentStream {
            rx,
            idle_timeout: self.idle_timeout,
            cancel: cancel.clone(),
            finished: false,
            usage: None,
        })
    }

    fn request(&self, prompt: &ComposedPrompt, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: prompt.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn bounded<T>(
        &self,
        exchange: impl Future<Output = Result<T, ProviderError>>,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(self.attempt_timeout, exchange) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "{} did not respond within {}s",
                    self.provider.name(),
                    self.attempt_timeout.as_secs_f32()
                ))),
            },
        }
    }
}

/// Lazy, single-pass sequence of text fragments from one exchange.
///
/// Dropping it (or cancelling its token) closes the provider channel, which
/// stops the upstream reader.
pub struct FragmentStream {
    rx: ChunkReceiver,
    idle_timeout: Duration,
    cancel: CancellationToken,
    finished: bool,
    usage: Option<Usage>,
}

impl FragmentStream {
    /// Next non-empty fragment, `None` once the provider signalled completion,
    /// or the error that ended the exchange. Nothing follows an error.
    pub async fn next(&mut self) -> Option<Result<String, ProviderError>> {
        loop {
            if self.finished {
                return None;
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                received = tokio::time::timeout(self.idle_timeout, self.rx.recv()) => Some(received),
            };
            let Some(received) = received else {
                return Some(Err(self.abort(ProviderError::Cancelled)));
            };

            let chunk = match received {
                Err(_) => {
                    let err = ProviderError::Timeout(format!(
                        "no fragment within {}s",
                        self.idle_timeout.as_secs_f32()
                    ));
                    return Some(Err(self.abort(err)));
                }
                Ok(None) => {
                    let err = ProviderError::StreamInterrupted(
                        "provider closed the stream before completing".into(),
                    );
                    return Some(Err(self.abort(err)));
                }
                Ok(Some(Err(err))) => return Some(Err(self.abort(err))),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if chunk.usage.is_some() {
                self.usage = chunk.usage;
            }
            if chunk.done {
                self.finished = true;
                self.rx.close();
            }
            match chunk.content {
                Some(text) if !text.is_empty() => return Some(Ok(text)),
                _ => continue,
            }
        }
    }

    /// Token usage, once the provider reported it.
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    fn abort(&mut self, err: ProviderError) -> ProviderError {
        self.finished = true;
        self.rx.close();
        err
    }
}
