//! Sending side of the channel.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
    time::Duration,
};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    envelope::{CorrelationId, Envelope},
    error::ChannelError,
    handler::RequestHandler,
    registry::ChannelRegistry,
    window::WindowHandle,
};

/// A request/response channel from this window to one target window.
///
/// The channel is *idle* while no request is outstanding and *active*
/// otherwise. Concurrent sends are safe: every request carries its own
/// correlation id and nothing orders distinct requests.
#[derive(Clone)]
pub struct MessageChannel {
    registry: Arc<ChannelRegistry>,
    target: WindowHandle,
}

impl MessageChannel {
    pub fn new(registry: Arc<ChannelRegistry>, target: WindowHandle) -> Self {
        Self { registry, target }
    }

    pub fn target(&self) -> &WindowHandle {
        &self.target
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Post `payload` as a request to the target window.
    ///
    /// The request is posted before this returns. The returned
    /// [`PendingResponse`] settles when the matching response arrives; if
    /// none ever does it stays pending forever.
    ///
    /// # Errors
    ///
    /// Fails immediately if the registry has been shut down, the envelope
    /// cannot be encoded or the target window is closed. No pending entry is
    /// left behind in that case.
    pub fn send(&self, payload: Value) -> Result<PendingResponse, ChannelError> {
        let id = CorrelationId::random(&mut rand::thread_rng());
        let receiver = self.registry.register(id.clone())?;

        let posted = Envelope::request(id.clone(), payload)
            .to_value()
            .and_then(|data| self.target.post_message(data, self.registry.window()));
        if let Err(e) = posted {
            self.registry.evict(&id);
            return Err(e);
        }

        debug!(%id, target = self.target.id(), "request posted");
        Ok(PendingResponse {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// [`send`](Self::send), bounded by `deadline`.
    pub async fn send_with_deadline(
        &self,
        payload: Value,
        deadline: Duration,
    ) -> Result<Value, ChannelError> {
        self.send(payload)?.with_deadline(deadline).await
    }

    /// Register the handler used when this window is the responder.
    pub fn on_request<H: RequestHandler>(&self, handler: H) {
        self.registry.set_handler(Arc::new(handler));
    }

    /// Requests outstanding on this window's registry.
    ///
    /// The count is per window, not per channel: every channel sharing the
    /// registry reports the same value.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Whether any request sent through this window is outstanding, by any
    /// channel sharing the registry.
    pub fn is_active(&self) -> bool {
        self.pending_count() > 0
    }
}

/// Deferred response to a request.
///
/// Resolves to the response payload. Dropping it abandons the result; the
/// pending entry is discarded when the response eventually arrives.
#[must_use = "a request's response is only observed by awaiting it"]
pub struct PendingResponse {
    id: CorrelationId,
    receiver: oneshot::Receiver<Value>,
    registry: Weak<ChannelRegistry>,
}

impl PendingResponse {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Wait at most `deadline` for the response.
    ///
    /// On expiry the pending entry is evicted, so a late response is treated
    /// as unmatched, and [`ChannelError::Timeout`] is returned.
    pub async fn with_deadline(self, deadline: Duration) -> Result<Value, ChannelError> {
        let id = self.id.clone();
        let registry = self.registry.clone();

        match tokio::time::timeout(deadline, self).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(registry) = registry.upgrade() {
                    registry.evict(&id);
                }
                warn!(%id, ?deadline, "request deadline elapsed");
                Err(ChannelError::Timeout(deadline))
            }
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<Value, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| ChannelError::ChannelClosed))
    }
}
