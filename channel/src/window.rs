//! In-process model of browsing-context windows.
//!
//! A [`WindowContext`] owns the inbox of one window (a page, an iframe or a
//! popup). Other parties hold cloneable [`WindowHandle`]s and deliver
//! messages with [`WindowHandle::post_message`]. Every delivered
//! [`MessageEvent`] records the sender's origin and a handle back to the
//! sending window, so a responder can reply to whoever asked.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Process-unique window identifier.
pub type WindowId = u64;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// A message delivered to a window.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Posted data.
    pub data: Value,
    /// Origin of the sending window.
    pub origin: String,
    /// The sending window.
    pub source: WindowHandle,
}

/// Cloneable reference to a window that accepts posted messages.
#[derive(Clone)]
pub struct WindowHandle {
    id: WindowId,
    origin: String,
    sender: mpsc::UnboundedSender<MessageEvent>,
}

impl WindowHandle {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Deliver `data` to this window on behalf of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::WindowClosed`] if the window's context has been
    /// dropped.
    pub fn post_message(&self, data: Value, source: &WindowHandle) -> Result<(), ChannelError> {
        self.sender
            .send(MessageEvent {
                data,
                origin: source.origin.clone(),
                source: source.clone(),
            })
            .map_err(|_| ChannelError::WindowClosed)
    }

    /// Whether the window's context is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for WindowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WindowHandle {}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .finish()
    }
}

/// The receiving side of a window.
///
/// Exactly one listener can consume a context's inbox; installing a
/// `ChannelRegistry` takes ownership of it.
#[derive(Debug)]
pub struct WindowContext {
    handle: WindowHandle,
    inbox: mpsc::UnboundedReceiver<MessageEvent>,
}

impl WindowContext {
    /// Open a new window context for `origin`.
    pub fn open(origin: impl Into<String>) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let handle = WindowHandle {
            id: NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed),
            origin: origin.into(),
            sender,
        };
        Self { handle, inbox }
    }

    /// A handle other windows can post to.
    pub fn handle(&self) -> WindowHandle {
        self.handle.clone()
    }

    /// Wait for the next message delivered to this window.
    pub async fn next_message(&mut self) -> Option<MessageEvent> {
        self.inbox.recv().await
    }

    /// The next already-delivered message, without waiting.
    pub fn try_next_message(&mut self) -> Option<MessageEvent> {
        self.inbox.try_recv().ok()
    }

    pub(crate) fn into_parts(self) -> (WindowHandle, mpsc::UnboundedReceiver<MessageEvent>) {
        (self.handle, self.inbox)
    }
}
