//! Backend capability contract
//!
//! This module defines the trait every computation backend implements. The
//! routing layer depends only on this contract, never on transport details.

use crate::completion::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::error::{Error, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lazy, finite, non-restartable sequence of completion chunks
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// What a backend can do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Whether `stream_complete` is supported
    pub supports_streaming: bool,
    /// Whether `embed` is supported
    pub supports_embeddings: bool,
    /// Models this backend serves
    pub supported_models: Vec<String>,
}

/// Trait for computation backends
///
/// Implementations must honour `cancel`: once it fires, the call should stop
/// work and return [`Error::Cancelled`] promptly.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Report capabilities
    fn capabilities(&self) -> BackendCapabilities;

    /// Complete a conversation
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse>;

    /// Complete a conversation incrementally
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream>;

    /// Embed a piece of text
    async fn embed(
        &self,
        _text: &str,
        _model: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        Err(Error::Unsupported(format!("{} does not embed", self.name())))
    }

    /// Health check
    async fn is_available(&self, cancel: &CancellationToken) -> bool;
}
