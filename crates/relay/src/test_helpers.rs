//! Scripted provider for relay tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mailmate_core::{
    ChunkReceiver, Provider, ProviderError, ProviderRequest, ProviderResponse, StreamChunk,
};
use tokio::sync::mpsc;

/// What the provider does on one call.
pub enum Step {
    Reply(String),
    Fail(ProviderError),
    /// Streams `parts` with `gap` between them, then completes.
    Fragments { parts: Vec<String>, gap: Duration },
    /// Streams `parts`, then fails.
    FragmentsThenFail(Vec<String>, ProviderError),
    /// Streams `parts`, then closes without completing.
    EndWithoutDone(Vec<String>),
    /// Never answers.
    Stall,
}

impl Step {
    pub fn reply(text: &str) -> Self {
        Self::Reply(text.into())
    }

    pub fn fragments<const N: usize>(parts: [&str; N]) -> Self {
        Self::Fragments {
            parts: parts.iter().map(|p| p.to_string()).collect(),
            gap: Duration::ZERO,
        }
    }

    pub fn transient() -> Self {
        Self::Fail(ProviderError::Network("connection reset".into()))
    }
}

enum Ending {
    Done,
    Fail(ProviderError),
    Close,
}

pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    last_request: Mutex<Option<ProviderRequest>>,
    aborted: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
            aborted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Exchanges opened so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }

    /// Whether a stream found its receiver gone before it finished.
    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn next_step(&self, request: ProviderRequest) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Fail(ProviderError::NotConfigured("script exhausted".into())))
    }

    fn spawn_stream(&self, parts: Vec<String>, gap: Duration, ending: Ending) -> ChunkReceiver {
        let (tx, rx) = mpsc::channel(8);
        let aborted = self.aborted.clone();
        tokio::spawn(async move {
            for (i, part) in parts.into_iter().enumerate() {
                if i > 0 && !gap.is_zero() {
                    tokio::time::sleep(gap).await;
                }
                if tx.send(Ok(StreamChunk::text(part))).await.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                    return;
                }
            }
            let last = match ending {
                Ending::Done => Ok(StreamChunk::finished(None)),
                Ending::Fail(e) => Err(e),
                Ending::Close => return,
            };
            if tx.send(last).await.is_err() {
                aborted.store(true, Ordering::SeqCst);
            }
        });
        rx
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let text = match self.next_step(request) {
            Step::Reply(text) => text,
            Step::Fragments { parts, .. } => parts.concat(),
            Step::Fail(e) | Step::FragmentsThenFail(_, e) => return Err(e),
            Step::EndWithoutDone(_) => {
                return Err(ProviderError::StreamInterrupted("closed".into()));
            }
            Step::Stall => std::future::pending().await,
        };
        Ok(ProviderResponse {
            text,
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match self.next_step(request) {
            Step::Reply(text) => Ok(self.spawn_stream(vec![text], Duration::ZERO, Ending::Done)),
            Step::Fragments { parts, gap } => Ok(self.spawn_stream(parts, gap, Ending::Done)),
            Step::FragmentsThenFail(parts, e) => {
                Ok(self.spawn_stream(parts, Duration::ZERO, Ending::Fail(e)))
            }
            Step::EndWithoutDone(parts) => {
                Ok(self.spawn_stream(parts, Duration::ZERO, Ending::Close))
            }
            Step::Fail(e) => Err(e),
            Step::Stall => std::future::pending().await,
        }
    }
}
