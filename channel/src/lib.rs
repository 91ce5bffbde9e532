#![deny(unsafe_code)]

//! Keychain message channel.
//!
//! A correlated request/response protocol carried over inter-window
//! messaging. The host page and the privileged keychain frame each own a
//! [`ChannelRegistry`] installed on their window context. Requests are
//! posted as tagged [`Envelope`]s carrying a fresh [`CorrelationId`]; the
//! matching response envelope settles exactly the caller that sent it.
//!
//! ```text
//!   host window                                keychain frame
//!   ───────────                                ──────────────
//!   MessageChannel::send ── request{id} ──────→ ChannelRegistry
//!        │                                          │ RequestHandler::handle
//!   PendingResponse ←──────── response{id} ─────────┘ (posted to event.source)
//! ```
//!
//! ## Guarantees
//!
//! - A response is accepted only if its id is currently pending; anything
//!   else is dropped without effect
//! - Responses may arrive in any order; each resolves only its own caller
//! - There is no built-in timeout. [`PendingResponse::with_deadline`] layers
//!   bounded waiting on top and evicts the pending entry when it elapses

mod channel;
mod envelope;
mod error;
mod handler;
mod registry;
mod window;

pub use channel::{MessageChannel, PendingResponse};
pub use envelope::{CorrelationId, Envelope, EnvelopeKind, CHANNEL_TAG};
pub use error::ChannelError;
pub use handler::RequestHandler;
pub use registry::ChannelRegistry;
pub use window::{MessageEvent, WindowContext, WindowHandle, WindowId};
