//! Transparent wrapper over an upstream chunk stream.
//!
//! Reconciles usage into the owning [`crate::ModelState`] exactly once, at
//! whichever chunk carries a usage record (normally the last one), and
//! translates a terminating error the same way [`crate::Deployment::create`]
//! does for the non-streaming path.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;

use crate::error::SwitchboardError;
use crate::model_state::ModelState;
use crate::types::ChatCompletionChunk;
use crate::upstream::{classify, ChunkStream};

pin_project! {
    /// Wraps an [`Upstream`](crate::Upstream) chunk stream, keeping a
    /// reference to the target [`ModelState`] and the preflight token
    /// offset it must reconcile against.
    pub struct StreamWrapper {
        #[pin]
        inner: ChunkStream,
        model: Arc<ModelState>,
        deployment: String,
        preflight: i64,
        reconciled: bool,
    }
}

impl StreamWrapper {
    pub fn new(inner: ChunkStream, model: Arc<ModelState>, deployment: String, preflight: i64) -> Self {
        Self {
            inner,
            model,
            deployment,
            preflight,
            reconciled: false,
        }
    }
}

impl Stream for StreamWrapper {
    type Item = Result<ChatCompletionChunk, SwitchboardError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !*this.reconciled {
                    if let Some(usage) = chunk.usage {
                        this.model
                            .spend_tokens(usage.total_tokens as i64 - *this.preflight);
                        *this.reconciled = true;
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                let translated = classify(&err, &**this.model, this.deployment.as_str());
                Poll::Ready(Some(Err(translated)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
