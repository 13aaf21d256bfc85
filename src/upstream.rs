//! The opaque external collaborator: the actual chat-completion HTTP
//! client. Consumed only through this trait; no concrete implementation
//! ships in this crate.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::error::SwitchboardError;
use crate::model_state::ModelState;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};

/// A chunk stream yielded by a streaming [`Upstream::stream`] call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, UpstreamError>> + Send>>;

/// Errors an upstream client can surface, already categorized into the
/// kinds [`crate::error::SwitchboardError`] distinguishes.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Upstream signaled quota exhaustion (HTTP 429 or provider-specific
    /// equivalent).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A 4xx response other than rate-limiting: malformed request, auth
    /// failure, and the like.
    #[error("Client fault: {0}")]
    ClientFault(String),

    /// Timeout, connection failure, 5xx, or anything else unclassified.
    #[error("Transient error: {0}")]
    Transient(String),
}

/// The interface a concrete chat-completion client implements to be
/// usable by a [`crate::Deployment`]. Implementations are expected to be
/// cheap to clone (an `Arc` handle around a connection pool, typically).
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issue one non-streaming chat-completion request.
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, UpstreamError>;

    /// Issue one streaming chat-completion request.
    async fn stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError>;
}

/// Shared translation from an [`UpstreamError`] into a
/// [`SwitchboardError`], applying the mark-down policy from the error
/// taxonomy: `RateLimited` and `Transient` mark the model down,
/// `ClientFault` does not.
pub(crate) fn classify(err: &UpstreamError, model: &ModelState, deployment: &str) -> SwitchboardError {
    match err {
        UpstreamError::RateLimited(_) => {
            tracing::warn!(deployment, model = model.name(), "marking down model, rate limited");
            model.mark_down(None);
            SwitchboardError::RateLimited {
                deployment: deployment.to_string(),
            }
        }
        UpstreamError::ClientFault(message) => SwitchboardError::ClientFault {
            deployment: deployment.to_string(),
            message: message.clone(),
        },
        UpstreamError::Transient(message) => {
            tracing::warn!(deployment, model = model.name(), "marking down model, transient upstream error");
            model.mark_down(None);
            SwitchboardError::TransientUpstreamError {
                deployment: deployment.to_string(),
                message: message.clone(),
            }
        }
    }
}
