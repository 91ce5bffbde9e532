//! Per-window listener and pending-request table.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::{
    envelope::{CorrelationId, Envelope, EnvelopeKind},
    error::ChannelError,
    handler::RequestHandler,
    window::{MessageEvent, WindowContext, WindowHandle},
};

/// The inbound side of one window context.
///
/// The embedding application installs exactly one registry per window
/// context and passes it to every component that sends or receives. The
/// registry owns:
///
/// - the listener task draining the window's inbox
/// - the table of requests awaiting a response
/// - the single handler used when this window is the responder
///
/// Dropping the registry (or calling [`ChannelRegistry::shutdown`]) stops the
/// listener and fails every pending caller with `ChannelClosed`.
pub struct ChannelRegistry {
    window: WindowHandle,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Value>>>,
    handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChannelRegistry {
    /// Install the listener on `context`.
    ///
    /// The context is consumed, so a second listener on the same window
    /// cannot exist. Must be called from within a tokio runtime.
    pub fn install(context: WindowContext) -> Arc<Self> {
        let (window, inbox) = context.into_parts();
        let registry = Arc::new(Self {
            window,
            pending: Mutex::new(HashMap::new()),
            handler: RwLock::new(None),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(listen(Arc::downgrade(&registry), inbox));
        *registry.listener.lock() = Some(task);

        debug!(window = registry.window.id(), "channel listener installed");
        registry
    }

    /// The window this registry listens on.
    pub fn window(&self) -> &WindowHandle {
        &self.window
    }

    /// Register the handler serving inbound requests, replacing any previous
    /// one.
    pub fn set_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop listening. Pending callers fail with `ChannelClosed`, and so
    /// does every later send.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
        let dropped = {
            let mut pending = self.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        self.handler.write().take();
        debug!(window = self.window.id(), dropped, "channel listener shut down");
    }

    pub(crate) fn register(
        &self,
        id: CorrelationId,
    ) -> Result<oneshot::Receiver<Value>, ChannelError> {
        let mut pending = self.pending.lock();
        // Checked under the lock so a concurrent shutdown cannot miss the entry.
        if self.is_closed() {
            return Err(ChannelError::ChannelClosed);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(rx)
    }

    pub(crate) fn evict(&self, id: &CorrelationId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    fn dispatch(&self, event: MessageEvent) {
        let Some(envelope) = Envelope::parse(&event.data) else {
            trace!("ignoring message not addressed to this channel");
            return;
        };

        match envelope.kind {
            EnvelopeKind::Response => self.resolve(envelope.id, envelope.payload),
            EnvelopeKind::Request => {
                self.serve(envelope.id, envelope.payload, event.origin, event.source)
            }
        }
    }

    fn resolve(&self, id: CorrelationId, payload: Value) {
        let Some(resolver) = self.pending.lock().remove(&id) else {
            debug!(%id, "discarding unmatched response");
            return;
        };
        // The caller may have dropped its PendingResponse.
        if resolver.send(payload).is_err() {
            trace!(%id, "response arrived after caller went away");
        }
    }

    fn serve(&self, id: CorrelationId, payload: Value, origin: String, source: WindowHandle) {
        let Some(handler) = self.handler.read().clone() else {
            debug!(%id, %origin, "no request handler registered, dropping request");
            return;
        };
        let window = self.window.clone();

        tokio::spawn(async move {
            let reply = handler.handle(payload, &origin).await;
            let posted = Envelope::response(id.clone(), reply)
                .to_value()
                .and_then(|data| source.post_message(data, &window));
            if let Err(e) = posted {
                warn!(%id, "failed to post response: {}", e);
            }
        });
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}

async fn listen(registry: Weak<ChannelRegistry>, mut inbox: mpsc::UnboundedReceiver<MessageEvent>) {
    while let Some(event) = inbox.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.dispatch(event);
    }
}
