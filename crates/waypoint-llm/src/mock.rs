//! Scripted backend for testing and dry runs
//!
//! Outcomes are queued with [`ScriptedBackend::push`] and consumed one per
//! call. When the queue is empty the backend answers `"<name> response"`.

use crate::backend::{Backend, BackendCapabilities, ChunkStream};
use crate::completion::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One queued outcome
#[derive(Debug)]
pub enum Script {
    /// Succeed with this text (a single chunk when streamed)
    Reply(String),
    /// Fail with this error
    Fail(Error),
    /// Stream these items in order, then end
    Stream(Vec<Result<StreamChunk>>),
    /// Stream whatever arrives on this channel until the sender is dropped
    Channel(mpsc::UnboundedReceiver<Result<StreamChunk>>),
    /// Never answer; returns `Cancelled` once the caller cancels
    Hang,
}

/// A backend that replays queued outcomes and counts calls
pub struct ScriptedBackend {
    name: String,
    script: Arc<Mutex<VecDeque<Script>>>,
    calls: AtomicUsize,
    available: AtomicBool,
}

impl ScriptedBackend {
    /// Create a scripted backend
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Queue an outcome
    pub fn push(&self, script: Script) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(script);
    }

    /// Queue `count` copies of a failure produced by `make`
    pub fn push_failures(&self, count: usize, make: impl Fn() -> Error) {
        for _ in 0..count {
            self.push(Script::Fail(make()));
        }
    }

    /// Number of calls received (complete, stream and embed)
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Change what `is_available` reports
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn next(&self) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Script::Reply(format!("{} response", self.name)))
    }

    fn response(&self, content: String, model: &str) -> CompletionResponse {
        CompletionResponse {
            content,
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_streaming: true,
            supports_embeddings: true,
            supported_models: vec![format!("{}-model", self.name)],
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.next() {
            Script::Reply(text) => Ok(self.response(text, &request.model)),
            Script::Fail(err) => Err(err),
            Script::Stream(items) => {
                let mut content = String::new();
                for item in items {
                    content.push_str(&item?.delta);
                }
                Ok(self.response(content, &request.model))
            }
            Script::Channel(mut rx) => {
                let mut content = String::new();
                while let Some(item) = rx.recv().await {
                    content.push_str(&item?.delta);
                }
                Ok(self.response(content, &request.model))
            }
            Script::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }

    async fn stream_complete(
        &self,
        _request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.next() {
            Script::Reply(text) => Ok(stream::iter(vec![Ok(StreamChunk::text(text))]).boxed()),
            Script::Fail(err) => Err(err),
            Script::Stream(items) => Ok(stream::iter(items).boxed()),
            Script::Channel(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            Script::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }

    async fn embed(
        &self,
        text: &str,
        _model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.next() {
            Script::Fail(err) => Err(err),
            Script::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
            _ => Ok(vec![text.chars().count() as f32, 1.0]),
        }
    }

    async fn is_available(&self, _cancel: &CancellationToken) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
