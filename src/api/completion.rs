use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures_util::Stream;
use tracing::debug;

use crate::controller::state::{ExitReason, ExitTrigger};

/// Response body that fires the exit trigger once the transport has pulled
/// the whole payload.
///
/// The payload is yielded as a single chunk. The trigger fires on the poll
/// after it, when the server asks for more and learns the body is finished.
/// If the body is dropped first (the peer went away mid-response) the trigger
/// fires from `Drop` instead, so an accepted stop always reaches the exit
/// path.
pub struct ExitOnCompletion {
    payload: Option<Bytes>,
    trigger: Option<ExitTrigger>,
}

impl ExitOnCompletion {
    pub fn new(payload: impl Into<Bytes>, trigger: ExitTrigger) -> Self {
        Self {
            payload: Some(payload.into()),
            trigger: Some(trigger),
        }
    }

    fn complete(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.fire(0, ExitReason::ShutdownRequested);
        }
    }
}

impl Stream for ExitOnCompletion {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(payload) = this.payload.take() {
            return Poll::Ready(Some(Ok(payload)));
        }
        this.complete();
        Poll::Ready(None)
    }
}

impl Drop for ExitOnCompletion {
    fn drop(&mut self) {
        if self.trigger.is_some() {
            debug!("shutdown response dropped before completion");
            self.complete();
        }
    }
}
