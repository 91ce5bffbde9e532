//! Keychain trust-boundary core
//!
//! The keychain is a wallet component running in a window separate from the
//! host application. This crate holds both sides of its trust boundary:
//!
//! - **RPC**: the host's [`Client`] and [`RemoteAccount`] send typed
//!   [`Request`]s over a [`kc_channel::MessageChannel`]; the keychain frame
//!   answers through a [`KeychainResponder`]. The host never holds key
//!   material.
//! - **Snapshots**: [`SnapshotTransfer`] carries namespaced local state
//!   across a cross-origin redirect, ciphertext in the URL fragment and key
//!   in a short-lived cookie.
//!
//! ## Security Model
//!
//! - The host window is untrusted; the responder acts on the origin recorded
//!   by the message event, not the one the payload claims
//! - Neither snapshot carrier alone reveals or reconstructs the state
//! - Tampered snapshots are rejected before any state is written
//! - Restoring requires an explicit [`AccessGrant`]

pub mod account;
pub mod client;
pub mod config;
pub mod cookie;
pub mod fragment;
pub mod responder;
pub mod rpc;
pub mod snapshot;
pub mod storage;

pub mod commands;

pub use account::{AccountError, RemoteAccount, RpcCaller};
pub use client::{Client, ClientOptions, PopupOpener};
pub use config::KeychainConfig;
pub use cookie::{AccessGrant, CookieStore, FileCookieStore, MemoryCookieStore, TransportSecurity};
pub use responder::{dispatch, Keychain, KeychainResponder};
pub use rpc::{Request, Scope};
pub use snapshot::{SnapshotError, SnapshotOptions, SnapshotTransfer};
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
